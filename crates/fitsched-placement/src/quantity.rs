//! Resource quantity normalization.
//!
//! CPU normalizes to millicores. Memory normalizes to "memory units":
//! `Mi` is taken as-is, `Ki` is divided by 1024, `Gi` is multiplied by
//! 1000, and a bare decimal is multiplied by 1000. The `Gi` and bare
//! scales do not agree with `Mi`; they are kept because existing
//! capacity figures were expressed in them. Both the used side and the
//! allocatable side go through these same two functions, so figures
//! stay comparable.
//!
//! A request or allocatable entry that is absent counts as zero. A
//! present but malformed string is always an error.

use std::fmt;

use serde::Serialize;

use fitsched_core::{Container, Pod, RESOURCE_CPU, RESOURCE_MEMORY};

use crate::error::{PlacementError, PlacementResult, QuantityError};

/// Which resource a quantity measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Cpu => f.write_str("CPU"),
            ResourceKind::Memory => f.write_str("memory"),
        }
    }
}

/// CPU (millicores) and memory (memory units) in normalized form.
///
/// Signed: free capacity goes negative when the snapshot is inconsistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Resources {
    pub cpu: i64,
    pub memory: i64,
}

impl Resources {
    pub const ZERO: Resources = Resources { cpu: 0, memory: 0 };

    pub fn new(cpu: i64, memory: i64) -> Self {
        Self { cpu, memory }
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Memory => self.memory,
        }
    }

    /// Component-wise sum, `None` if either resource overflows.
    pub fn checked_add(self, rhs: Resources) -> Option<Resources> {
        Some(Resources {
            cpu: self.cpu.checked_add(rhs.cpu)?,
            memory: self.memory.checked_add(rhs.memory)?,
        })
    }

    /// Component-wise difference, `None` if either resource overflows.
    pub fn checked_sub(self, rhs: Resources) -> Option<Resources> {
        Some(Resources {
            cpu: self.cpu.checked_sub(rhs.cpu)?,
            memory: self.memory.checked_sub(rhs.memory)?,
        })
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu={}m memory={}", self.cpu, self.memory)
    }
}

/// Normalize a CPU quantity to millicores.
///
/// `"250m"` → 250, `"2"` → 2000, `"0.5"` → 500. Fractions finer than a
/// millicore are truncated.
pub fn normalize_cpu(raw: &str) -> Result<i64, QuantityError> {
    let kind = ResourceKind::Cpu;
    match raw.strip_suffix('m') {
        Some(millis) => parse_integer(millis, kind, raw),
        None => parse_thousandths(raw, kind, raw),
    }
}

/// Normalize a memory quantity to memory units.
///
/// `"512Mi"` → 512, `"2048Ki"` → 2, `"2Gi"` → 2000, `"1.5"` → 1500.
pub fn normalize_memory(raw: &str) -> Result<i64, QuantityError> {
    let kind = ResourceKind::Memory;
    if let Some(kib) = raw.strip_suffix("Ki") {
        Ok(parse_integer(kib, kind, raw)? / 1024)
    } else if let Some(gib) = raw.strip_suffix("Gi") {
        parse_integer(gib, kind, raw)?
            .checked_mul(1000)
            .ok_or_else(|| QuantityError::new(kind, raw))
    } else if let Some(mib) = raw.strip_suffix("Mi") {
        parse_integer(mib, kind, raw)
    } else {
        parse_thousandths(raw, kind, raw)
    }
}

/// Summed requests of one container. Absent requests count as zero.
pub fn container_requests(container: &Container) -> Result<Resources, QuantityError> {
    let cpu = container.request(RESOURCE_CPU).map(normalize_cpu).transpose()?;
    let memory = container
        .request(RESOURCE_MEMORY)
        .map(normalize_memory)
        .transpose()?;
    Ok(Resources::new(cpu.unwrap_or(0), memory.unwrap_or(0)))
}

/// Summed requests over every container of a pod.
pub fn pod_requests(pod: &Pod) -> PlacementResult<Resources> {
    let object = || format!("pod {}", pod.name());
    pod.spec
        .containers
        .iter()
        .try_fold(Resources::ZERO, |acc, c| -> PlacementResult<Resources> {
            let requests = container_requests(c).map_err(|source| PlacementError::Quantity {
                object: object(),
                source,
            })?;
            acc.checked_add(requests)
                .ok_or_else(|| PlacementError::Overflow { object: object() })
        })
}

/// Unsigned decimal integer, digits only.
fn parse_integer(digits: &str, kind: ResourceKind, raw: &str) -> Result<i64, QuantityError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QuantityError::new(kind, raw));
    }
    digits.parse::<i64>().map_err(|_| QuantityError::new(kind, raw))
}

/// Unsigned decimal (`"3"`, `"0.25"`, `"1."`, `".5"`) scaled by 1000 and
/// truncated. Computed on the digits so `"0.29"` is exactly 290.
fn parse_thousandths(s: &str, kind: ResourceKind, raw: &str) -> Result<i64, QuantityError> {
    let err = || QuantityError::new(kind, raw);
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(err());
    }
    if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(err());
    }

    let whole = if whole.is_empty() {
        0
    } else {
        whole.parse::<i64>().map_err(|_| err())?
    };
    let thousandths = frac
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(3)
        .fold(0i64, |acc, b| acc * 10 + i64::from(b - b'0'));

    whole
        .checked_mul(1000)
        .and_then(|w| w.checked_add(thousandths))
        .ok_or_else(err)
}
