//! Virtual-Table Catalog.
//!
//! Composed once at process start from three sources: a fixed list of
//! log/flow tables, one object table per registered object type, and
//! synthesized statistics tables. Held behind
//! an `Arc` handed to the REST layer; `column_values` dispatch mirrors
//! `opserver.py`'s `generator_info`.

pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::connection_state::ConnectionRegistry;
use crate::error::Result;
use crate::kv::ShardClient;
use crate::uve::UveCache;

pub use stats::{StatTableDef, STAT_OBJECTID_FIELD, STAT_VT_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchemaType {
    Log,
    Flow,
    Object,
    Stat,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub datatype: String,
    pub indexed: bool,
}

impl ColumnDef {
    fn new(name: impl Into<String>, datatype: &str, indexed: bool) -> Self {
        Self { name: name.into(), datatype: datatype.to_string(), indexed }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VirtualTable {
    pub name: String,
    pub display_name: Option<String>,
    pub schema: Schema,
    pub column_values: Vec<String>,
    /// Set only on synthesized statistics tables.
    pub obj_table: Option<String>,
}

const MODULE: &str = "MODULE";
const SOURCE: &str = "SOURCE";
const CATEGORY: &str = "Category";
const LEVEL: &str = "Level";

/// Static log/flow tables. The sandesh schema compiler that would normally
/// generate these from struct definitions is out of scope, so the well-known
/// table shapes are declared here directly.
fn base_tables() -> Vec<VirtualTable> {
    let log_columns = vec![
        ColumnDef::new("ObjectType", "string", true),
        ColumnDef::new("ObjectId", "string", true),
        ColumnDef::new("Source", "string", true),
        ColumnDef::new(MODULE, "string", true),
        ColumnDef::new("Category", "string", true),
        ColumnDef::new("Level", "int", true),
        ColumnDef::new("Timestamp", "int", true),
        ColumnDef::new("Messagetype", "string", true),
        ColumnDef::new("SequenceNum", "int", false),
        ColumnDef::new("Xmlmessage", "string", false),
    ];
    let flow_columns = vec![
        ColumnDef::new("UuidKey", "uuid", true),
        ColumnDef::new("Vrouter", "string", true),
        ColumnDef::new("Direction", "int", true),
        ColumnDef::new("Sourcevn", "string", true),
        ColumnDef::new("Destvn", "string", true),
        ColumnDef::new("Sourceip", "string", true),
        ColumnDef::new("Destip", "string", true),
        ColumnDef::new("Protocol", "int", true),
        ColumnDef::new("Sport", "int", true),
        ColumnDef::new("Dport", "int", true),
        ColumnDef::new("Bytes", "int", false),
        ColumnDef::new("Packets", "int", false),
        ColumnDef::new("Setup_time", "int", true),
        ColumnDef::new("Teardown_time", "int", false),
    ];

    vec![
        VirtualTable {
            name: "MessageTable".to_string(),
            display_name: None,
            schema: Schema { schema_type: SchemaType::Log, columns: log_columns },
            column_values: vec![MODULE.to_string(), SOURCE.to_string(), CATEGORY.to_string(), LEVEL.to_string()],
            obj_table: None,
        },
        VirtualTable {
            name: "FlowSeriesTable".to_string(),
            display_name: None,
            schema: Schema { schema_type: SchemaType::Flow, columns: flow_columns },
            column_values: vec![SOURCE.to_string()],
            obj_table: None,
        },
    ]
}

/// Registered object types: all object tables share a schema, keyed by the
/// UVE table they surface.
fn object_table_names() -> &'static [&'static str] {
    &["ObjectVNTable", "ObjectVMTable", "ObjectBgpPeer", "ObjectVRouter"]
}

fn object_table_schema() -> Schema {
    Schema {
        schema_type: SchemaType::Object,
        columns: vec![
            ColumnDef::new("ObjectId", "string", true),
            ColumnDef::new(SOURCE, "string", true),
            ColumnDef::new("Timestamp", "int", true),
            ColumnDef::new("Messagetype", "string", true),
        ],
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlarmType {
    pub name: String,
    #[serde(rename = "type")]
    pub alarm_type: String,
    pub doc: String,
}

/// Alarm-type registry: UVE table -> known alarm types. The real
/// system loads these via an extension-point mechanism; the extension
/// modules themselves are an external collaborator, so the
/// registry here holds the shapes the REST surface needs to serve
/// `GET /analytics/alarms/<table>/types`.
fn alarm_type_registry() -> HashMap<String, Vec<AlarmType>> {
    let mut registry = HashMap::new();
    registry.insert(
        "ObjectVNTable".to_string(),
        vec![AlarmType {
            name: "PartialSysinfo".to_string(),
            alarm_type: "process-status".to_string(),
            doc: "Raised when a process reports partial system information.".to_string(),
        }],
    );
    registry.insert(
        "ObjectVRouter".to_string(),
        vec![AlarmType {
            name: "ProcessStatus".to_string(),
            alarm_type: "process-status".to_string(),
            doc: "Raised when a monitored process is not running.".to_string(),
        }],
    );
    registry
}

pub struct Catalog {
    tables: HashMap<String, VirtualTable>,
    alarm_types: HashMap<String, Vec<AlarmType>>,
}

impl Catalog {
    /// Builds the full catalog: base tables, object tables, and the
    /// statistics tables declared by `stat_defs`.
    pub fn build(stat_defs: &[StatTableDef]) -> Arc<Self> {
        let mut tables = HashMap::new();
        for t in base_tables() {
            tables.insert(t.name.clone(), t);
        }
        for name in object_table_names() {
            tables.insert(
                name.to_string(),
                VirtualTable {
                    name: name.to_string(),
                    display_name: None,
                    schema: object_table_schema(),
                    column_values: vec![SOURCE.to_string()],
                    obj_table: None,
                },
            );
        }
        for def in stat_defs {
            let table = stats::synthesize(def);
            tables.insert(table.name.clone(), table);
        }
        Arc::new(Self { tables, alarm_types: alarm_type_registry() })
    }

    pub fn get(&self, name: &str) -> Option<&VirtualTable> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &VirtualTable> {
        self.tables.values()
    }

    pub fn alarm_types_for(&self, table: &str) -> Vec<AlarmType> {
        self.alarm_types.get(table).cloned().unwrap_or_default()
    }

    /// `column_values(table, column)`.
    pub async fn column_values(
        &self,
        table: &str,
        column: &str,
        shards: &[String],
        redis_password: Option<&str>,
        registry: Arc<ConnectionRegistry>,
        cache: &UveCache,
    ) -> Result<Vec<String>> {
        if column == MODULE || column == SOURCE {
            return self.generators(column, shards, redis_password, registry).await;
        }
        if column == CATEGORY {
            return Ok(stats::category_map());
        }
        if column == LEVEL {
            return Ok(stats::level_list());
        }
        if column == STAT_OBJECTID_FIELD {
            if let Some(vt) = self.tables.get(table) {
                if let Some(obj_table) = &vt.obj_table {
                    return Ok(cache.get_uve_list(obj_table, &crate::uve::UveFilters::default()));
                }
            }
        }
        Ok(Vec::new())
    }

    /// Scans `NGENERATORS` across every known shard, splitting `src:_:mod:_`
    /// keys into distinct source/module values.
    async fn generators(
        &self,
        column: &str,
        shards: &[String],
        redis_password: Option<&str>,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Vec<String>> {
        let mut sources = Vec::new();
        let mut modules = Vec::new();
        for addr in shards {
            let client = ShardClient::connect(
                addr,
                crate::connection_state::ConnectionType::RedisUve,
                "UVE",
                redis_password,
                Arc::clone(&registry),
            )
            .await?;
            let members = client.smembers("NGENERATORS").await?;
            for key in members {
                let mut parts = key.split(':');
                if let (Some(source), Some(_), Some(module)) = (parts.next(), parts.next(), parts.next()) {
                    if !sources.contains(&source.to_string()) {
                        sources.push(source.to_string());
                    }
                    if !modules.contains(&module.to_string()) {
                        modules.push(module.to_string());
                    }
                }
            }
        }
        Ok(if column == MODULE { modules } else { sources })
    }
}
