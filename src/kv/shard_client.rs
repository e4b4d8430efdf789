//! Shard Client.
//!
//! Each `ShardClient` targets one kv-shard address and owns its connection.
//! Every method maps a lost connection to a single contract:
//! `OpError::NetworkUnavailable`, leaving HTTP status mapping to callers, and
//! updates the process-wide `ConnectionRegistry` on every up/down transition.

use crate::connection_state::{ConnectionRegistry, ConnectionStatus, ConnectionType};
use crate::error::{OpError, Result};
use futures_util::StreamExt;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A change-stream event delivered to a subscriber of a shard's pub/sub
/// channel.
#[derive(Debug, Clone)]
pub struct ShardEvent {
    pub channel: String,
    pub payload: String,
}

pub struct ShardClient {
    addr: String,
    role: ConnectionType,
    role_name: &'static str,
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
    registry: Arc<ConnectionRegistry>,
}

impl ShardClient {
    pub async fn connect(
        addr: &str,
        role: ConnectionType,
        role_name: &'static str,
        password: Option<&str>,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self> {
        let url = match password {
            Some(pw) => format!("redis://:{pw}@{addr}"),
            None => format!("redis://{addr}"),
        };
        let client = redis::Client::open(url)
            .map_err(|e| OpError::NetworkUnavailable(e.to_string()))?;
        let manager = client.get_connection_manager().await.map_err(|e| {
            registry.update(
                role,
                role_name,
                ConnectionStatus::Down,
                Some(e.to_string()),
                vec![addr.to_string()],
            );
            OpError::NetworkUnavailable(e.to_string())
        })?;
        registry.update(role, role_name, ConnectionStatus::Up, None, vec![addr.to_string()]);
        Ok(Self {
            addr: addr.to_string(),
            role,
            role_name,
            client,
            manager,
            registry,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn mark_down(&self, err: &redis::RedisError) -> OpError {
        self.registry.update(
            self.role,
            self.role_name,
            ConnectionStatus::Down,
            Some(err.to_string()),
            vec![self.addr.clone()],
        );
        OpError::NetworkUnavailable(err.to_string())
    }

    fn mark_up(&self) {
        self.registry.update(
            self.role,
            self.role_name,
            ConnectionStatus::Up,
            None,
            vec![self.addr.clone()],
        );
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let res: std::result::Result<Option<String>, _> = conn.get(key).await;
        match res {
            Ok(v) => {
                self.mark_up();
                Ok(v)
            }
            Err(e) => Err(self.mark_down(&e)),
        }
    }

    pub async fn hgetall(&self, key: &str) -> Result<std::collections::HashMap<String, String>> {
        let mut conn = self.manager.clone();
        conn.hgetall(key).await.map_err(|e| self.mark_down(&e)).map(|v| {
            self.mark_up();
            v
        })
    }

    pub async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>> {
        let mut conn = self.manager.clone();
        conn.hget(key, fields)
            .await
            .map_err(|e| self.mark_down(&e))
            .map(|v| {
                self.mark_up();
                v
            })
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        conn.smembers(key).await.map_err(|e| self.mark_down(&e)).map(|v| {
            self.mark_up();
            v
        })
    }

    pub async fn lrange(&self, key: &str, lo: isize, hi: isize) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        conn.lrange(key, lo, hi).await.map_err(|e| self.mark_down(&e)).map(|v| {
            self.mark_up();
            v
        })
    }

    pub async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.lpush(key, value).await.map_err(|e| self.mark_down(&e))?;
        self.mark_up();
        Ok(())
    }

    /// Pops the rightmost-waiting element with a deadline, matching the
    /// `blpop "REPLY:<qid>"` poll used to wait on query results, up to 10s.
    /// Returns `None` on timeout, not an error; callers translate that to
    /// `QueryEngineUnavailable`.
    pub async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<(String, String)>> {
        let mut conn = self.manager.clone();
        let fut = conn.blpop::<_, Option<(String, String)>>(key, 0.0);
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(v)) => {
                self.mark_up();
                Ok(v)
            }
            Ok(Err(e)) => Err(self.mark_down(&e)),
            Err(_) => Ok(None),
        }
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.hset(key, field, value).await.map_err(|e| self.mark_down(&e))?;
        self.mark_up();
        Ok(())
    }

    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let ok: bool = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async::<Option<String>>(&mut conn)
            .await
            .map(|v| v.is_some())
            .map_err(|e| self.mark_down(&e))?;
        self.mark_up();
        Ok(ok)
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.del(key).await.map_err(|e| self.mark_down(&e))?;
        self.mark_up();
        Ok(())
    }

    pub async fn persist(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.persist(key).await.map_err(|e| self.mark_down(&e))?;
        self.mark_up();
        Ok(())
    }

    pub async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.manager.clone();
        conn.ttl(key).await.map_err(|e| self.mark_down(&e)).map(|v| {
            self.mark_up();
            v
        })
    }

    pub async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .publish(channel, message)
            .await
            .map_err(|e| self.mark_down(&e))?;
        self.mark_up();
        Ok(())
    }

    /// Subscribes to `channel` on a dedicated pub/sub connection and forwards
    /// every message to the returned receiver until the subscriber task is
    /// dropped or the connection fails.
    pub async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<ShardEvent>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| self.mark_down(&e))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| self.mark_down(&e))?;

        let (tx, rx) = mpsc::channel(256);
        let channel = channel.to_string();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if tx
                    .send(ShardEvent {
                        channel: channel.clone(),
                        payload,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        self.mark_up();
        Ok(rx)
    }
}
