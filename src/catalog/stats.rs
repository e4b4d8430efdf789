//! Statistics-table schema expansion.
//!
//! Given a declared `(stat_type, stat_attr, attributes[])`, expands to the
//! full column set `opserver.py`'s `_VIRTUAL_TABLES` statistics loop builds:
//! `SOURCE`, time fields with `CLASS(...)`
//! bucketings, `UUID`, `COUNT(attr)`, and per numeric attribute `SUM`,
//! `CLASS`, `MAX`, `MIN`.

use super::{ColumnDef, Schema, SchemaType, VirtualTable};

pub const STAT_OBJECTID_FIELD: &str = "name";
pub const STAT_VT_PREFIX: &str = "StatTable";

const STAT_SOURCE_FIELD: &str = "SOURCE";
const STAT_TIME_FIELD: &str = "T";
const STAT_TIMEBIN_FIELD: &str = "T=";
const STAT_UUID_FIELD: &str = "UUID";

#[derive(Debug, Clone)]
pub struct StatAttrDef {
    pub name: String,
    /// `"int"`, `"double"`, or `"string"`: only numeric types get
    /// `SUM`/`CLASS`/`MAX`/`MIN` aggregates appended.
    pub datatype: String,
}

#[derive(Debug, Clone)]
pub struct StatTableDef {
    pub stat_type: String,
    pub stat_attr: String,
    pub display_name: Option<String>,
    pub attributes: Vec<StatAttrDef>,
    /// UVE object table this statistic's `STAT_OBJECTID_FIELD` resolves
    /// against, if any.
    pub obj_table: Option<String>,
}

pub fn synthesize(def: &StatTableDef) -> VirtualTable {
    let mut columns = vec![
        ColumnDef { name: STAT_SOURCE_FIELD.to_string(), datatype: "string".to_string(), indexed: true },
        ColumnDef { name: STAT_TIME_FIELD.to_string(), datatype: "int".to_string(), indexed: false },
        ColumnDef { name: format!("CLASS({STAT_TIME_FIELD})"), datatype: "int".to_string(), indexed: false },
        ColumnDef { name: STAT_TIMEBIN_FIELD.to_string(), datatype: "int".to_string(), indexed: false },
        ColumnDef { name: format!("CLASS({STAT_TIMEBIN_FIELD})"), datatype: "int".to_string(), indexed: false },
        ColumnDef { name: STAT_UUID_FIELD.to_string(), datatype: "uuid".to_string(), indexed: false },
        ColumnDef { name: format!("COUNT({})", def.stat_attr), datatype: "int".to_string(), indexed: false },
    ];

    let mut has_objectid = false;
    for attr in &def.attributes {
        if attr.name == STAT_OBJECTID_FIELD {
            has_objectid = true;
        }
        columns.push(ColumnDef { name: attr.name.clone(), datatype: attr.datatype.clone(), indexed: false });
        if attr.datatype == "int" || attr.datatype == "double" {
            for (agg, indexed) in [("SUM", false), ("CLASS", false), ("MAX", false), ("MIN", false)] {
                columns.push(ColumnDef {
                    name: format!("{agg}({})", attr.name),
                    datatype: attr.datatype.clone(),
                    indexed,
                });
            }
        }
    }
    if !has_objectid {
        columns.push(ColumnDef { name: STAT_OBJECTID_FIELD.to_string(), datatype: "string".to_string(), indexed: true });
    }

    let stat_id = format!("{}.{}", def.stat_type, def.stat_attr);
    VirtualTable {
        name: format!("{STAT_VT_PREFIX}.{stat_id}"),
        display_name: def.display_name.clone(),
        schema: Schema { schema_type: SchemaType::Stat, columns },
        column_values: vec![STAT_OBJECTID_FIELD.to_string(), STAT_SOURCE_FIELD.to_string()],
        obj_table: def.obj_table.clone(),
    }
}

/// Static category map known at startup.
pub fn category_map() -> Vec<String> {
    vec![
        "Default".to_string(),
        "System".to_string(),
        "Configuration".to_string(),
        "Security".to_string(),
    ]
}

/// Static severity level list known at startup.
pub fn level_list() -> Vec<String> {
    vec![
        "INVALID".to_string(),
        "EMERGENCY".to_string(),
        "ALERT".to_string(),
        "CRITICAL".to_string(),
        "ERROR".to_string(),
        "WARNING".to_string(),
        "NOTICE".to_string(),
        "INFO".to_string(),
        "DEBUG".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_attributes_get_four_aggregates() {
        let def = StatTableDef {
            stat_type: "UveVrouterStats".to_string(),
            stat_attr: "phy_if_stats".to_string(),
            display_name: None,
            attributes: vec![StatAttrDef { name: "in_bytes".to_string(), datatype: "int".to_string() }],
            obj_table: None,
        };
        let table = synthesize(&def);
        let names: Vec<&str> = table.schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"SUM(in_bytes)"));
        assert!(names.contains(&"CLASS(in_bytes)"));
        assert!(names.contains(&"MAX(in_bytes)"));
        assert!(names.contains(&"MIN(in_bytes)"));
        // No explicit objectid attribute supplied, so it's appended implicitly.
        assert!(names.contains(&STAT_OBJECTID_FIELD));
    }

    #[test]
    fn string_attributes_get_no_aggregates() {
        let def = StatTableDef {
            stat_type: "UveVrouterStats".to_string(),
            stat_attr: "if_name".to_string(),
            display_name: None,
            attributes: vec![StatAttrDef { name: "if_name".to_string(), datatype: "string".to_string() }],
            obj_table: None,
        };
        let table = synthesize(&def);
        let names: Vec<&str> = table.schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert!(!names.contains(&"SUM(if_name)"));
    }

    #[test]
    fn explicit_objectid_attribute_is_not_duplicated() {
        let def = StatTableDef {
            stat_type: "UveVrouterStats".to_string(),
            stat_attr: "if_stats".to_string(),
            display_name: None,
            attributes: vec![StatAttrDef { name: STAT_OBJECTID_FIELD.to_string(), datatype: "string".to_string() }],
            obj_table: None,
        };
        let table = synthesize(&def);
        let count = table.schema.columns.iter().filter(|c| c.name == STAT_OBJECTID_FIELD).count();
        assert_eq!(count, 1);
    }
}
