//! Partition-aware request routing (C5).
//!
//! Two pieces of server-reported state drive routing: the elastic
//! hashinator's token ring (from `@Statistics("TOPO", 0)`, second table)
//! plus the partition-to-host map (first table), and the per-procedure
//! metadata (from `@SystemCatalog("PROCEDURES")`) that says which
//! parameter, if any, carries the partitioning key. Only the `ELASTIC`
//! hashinator is supported; a server reporting `LEGACY` is rejected
//! outright rather than silently mis-routed.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{ClientError, Result};
use crate::hash;
use crate::table::Table;
use crate::value::Value;

/// The multi-partition initiator's pseudo-partition id. Every
/// multi-partition procedure, and every procedure this router has no
/// metadata for, is routed here.
pub const MP_INIT_PID: i32 = 16383;

#[derive(Debug, Clone, Deserialize)]
struct ProcedureInfoJson {
    #[serde(default = "default_none")]
    #[serde(rename = "partitionParameter")]
    partition_parameter: i32,
    #[serde(rename = "readOnly")]
    read_only: bool,
    #[serde(rename = "singlePartition")]
    single_partition: bool,
}

fn default_none() -> i32 {
    -1
}

#[derive(Debug, Clone)]
pub struct ProcedureInfo {
    pub partition_parameter: Option<usize>,
    pub read_only: bool,
    pub multi_part: bool,
}

impl ProcedureInfo {
    fn from_json(text: &str) -> Result<ProcedureInfo> {
        let parsed: ProcedureInfoJson = serde_json::from_str(text)
            .map_err(|e| ClientError::protocol(format!("bad procedure metadata json: {e}")))?;
        let multi_part = !parsed.single_partition;
        let partition_parameter = if multi_part || parsed.partition_parameter < 0 {
            None
        } else {
            Some(parsed.partition_parameter as usize)
        };
        Ok(ProcedureInfo {
            partition_parameter,
            read_only: parsed.read_only,
            multi_part,
        })
    }
}

/// A sorted token ring mapping 32-bit hash values to partitions.
#[derive(Debug, Clone, Default)]
pub struct ElasticHashinator {
    ring: Vec<(u32, i32)>,
}

impl ElasticHashinator {
    /// `tokens` is the server's `ELASTIC` config blob: a big-endian `i32`
    /// count followed by that many `(token: i32, partition: i32)` pairs,
    /// sorted ascending by token.
    pub fn parse(tokens: &[u8]) -> Result<ElasticHashinator> {
        if tokens.len() < 4 {
            return Err(ClientError::protocol("hashinator config too short"));
        }
        let count = i32::from_be_bytes(tokens[0..4].try_into().unwrap());
        if count < 0 {
            return Err(ClientError::protocol("negative token count"));
        }
        let count = count as usize;
        let expected_len = 4 + count * 8;
        if tokens.len() < expected_len {
            return Err(ClientError::protocol("hashinator config truncated"));
        }
        let mut ring = Vec::with_capacity(count);
        for i in 0..count {
            let base = 4 + i * 8;
            let token = i32::from_be_bytes(tokens[base..base + 4].try_into().unwrap()) as u32;
            let partition = i32::from_be_bytes(tokens[base + 4..base + 8].try_into().unwrap());
            ring.push((token, partition));
        }
        ring.sort_by_key(|(token, _)| *token);
        Ok(ElasticHashinator { ring })
    }

    fn partition_for_hash(&self, hash: i32) -> i32 {
        let hash = hash as u32;
        if self.ring.is_empty() {
            return MP_INIT_PID;
        }
        let idx = self.ring.partition_point(|(token, _)| *token <= hash);
        let idx = if idx == 0 { self.ring.len() - 1 } else { idx - 1 };
        self.ring[idx].1
    }

    pub fn hash_long(&self, value: i64) -> Result<i32> {
        Ok(self.partition_for_hash(hash::murmur3_32(&value.to_be_bytes())?))
    }

    pub fn hash_bytes(&self, bytes: &[u8]) -> Result<i32> {
        Ok(self.partition_for_hash(hash::murmur3_32(bytes)?))
    }

    /// Partition for a parameter value: a `NULL` partition key always
    /// routes to partition 0.
    pub fn hash_value(&self, value: &Value) -> Result<i32> {
        if value.is_null() {
            return Ok(0);
        }
        match value {
            Value::TinyInt(v) => self.hash_long(*v as i64),
            Value::SmallInt(v) => self.hash_long(*v as i64),
            Value::Integer(v) => self.hash_long(*v as i64),
            Value::BigInt(v) => self.hash_long(*v),
            Value::Float(v) => self.hash_long(v.to_bits() as i64),
            Value::Timestamp(v) => self.hash_long(v.micros()),
            Value::String(Some(bytes)) | Value::Varbinary(Some(bytes)) => self.hash_bytes(bytes),
            _ => Err(ClientError::UnsupportedType(format!(
                "{:?} cannot be used as a partitioning key",
                value.wire_tag()
            ))),
        }
    }
}

/// Routing state for the whole cluster: topology, hash ring, and
/// per-procedure metadata. Rebuilt wholesale whenever the client detects
/// a topology change, never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct Router {
    partition_to_host: HashMap<i32, i32>,
    hashinator: ElasticHashinator,
    procedures: HashMap<String, ProcedureInfo>,
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    /// `topo` is the two tables returned by `@Statistics("TOPO", 0)`:
    /// partition -> host mapping, then a single row carrying the
    /// hashinator's type and config blob.
    pub fn update_topology(&mut self, topo: &[Table]) -> Result<()> {
        let partitions = topo
            .first()
            .ok_or_else(|| ClientError::protocol("TOPO response missing partition table"))?;
        let mut partition_to_host = HashMap::new();
        for row in partitions.rows() {
            let partition_id = match row.get(0)? {
                Value::Integer(p) => p,
                other => {
                    return Err(ClientError::protocol(format!(
                        "unexpected partition id column type {:?}",
                        other.wire_tag()
                    )))
                }
            };
            let leader = match row.get(2)? {
                Value::String(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                other => {
                    return Err(ClientError::protocol(format!(
                        "unexpected leader column type {:?}",
                        other.wire_tag()
                    )))
                }
            };
            let host_id: i32 = leader
                .split(':')
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ClientError::protocol("malformed leader host:site token"))?;
            partition_to_host.insert(partition_id, host_id);
        }

        let hash_table = topo
            .get(1)
            .ok_or_else(|| ClientError::protocol("TOPO response missing hash config table"))?;
        let hash_row = hash_table
            .row(0)
            .map_err(|_| ClientError::protocol("TOPO hash config table is empty"))?;
        let hash_type = match hash_row.get(0)? {
            Value::String(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            other => {
                return Err(ClientError::protocol(format!(
                    "unexpected hash type column type {:?}",
                    other.wire_tag()
                )))
            }
        };
        if hash_type != "ELASTIC" {
            return Err(ClientError::ElasticModeMismatch);
        }
        let tokens = match hash_row.get(1)? {
            Value::Varbinary(Some(bytes)) => bytes,
            other => {
                return Err(ClientError::protocol(format!(
                    "unexpected hash config column type {:?}",
                    other.wire_tag()
                )))
            }
        };

        self.hashinator = ElasticHashinator::parse(&tokens)?;
        self.partition_to_host = partition_to_host;
        Ok(())
    }

    /// `procedures` is the single table returned by
    /// `@SystemCatalog("PROCEDURES")`: column 2 is the procedure name,
    /// column 6 its JSON partitioning metadata.
    pub fn update_procedures(&mut self, procedures: &Table) -> Result<()> {
        let mut map = HashMap::new();
        for row in procedures.rows() {
            let name = match row.get(2)? {
                Value::String(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                other => {
                    return Err(ClientError::protocol(format!(
                        "unexpected procedure name column type {:?}",
                        other.wire_tag()
                    )))
                }
            };
            let json = match row.get(6)? {
                Value::String(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                other => {
                    return Err(ClientError::protocol(format!(
                        "unexpected procedure metadata column type {:?}",
                        other.wire_tag()
                    )))
                }
            };
            map.insert(name, ProcedureInfo::from_json(&json)?);
        }
        self.procedures = map;
        Ok(())
    }

    pub fn procedure_info(&self, name: &str) -> Option<&ProcedureInfo> {
        self.procedures.get(name)
    }

    /// Chooses a partition for invoking `procedure_name` with `params`.
    /// Multi-partition and unknown procedures always go to
    /// [`MP_INIT_PID`].
    pub fn route_partition(&self, procedure_name: &str, params: &[Value]) -> Result<i32> {
        let info = match self.procedures.get(procedure_name) {
            Some(info) => info,
            None => return Ok(MP_INIT_PID),
        };
        if info.multi_part {
            return Ok(MP_INIT_PID);
        }
        let Some(position) = info.partition_parameter else {
            return Ok(MP_INIT_PID);
        };
        let value = params
            .get(position)
            .ok_or_else(|| ClientError::protocol("partitioning parameter position out of range"))?;
        self.hashinator.hash_value(value)
    }

    pub fn host_for_partition(&self, partition_id: i32) -> Option<i32> {
        self.partition_to_host.get(&partition_id).copied()
    }
}
