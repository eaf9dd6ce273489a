//! Problem record key schema.
//!
//! Records live under `{prefix}/{class}/{datacenter}/{node}/{check_id}` with
//! an optional trailing `/{service}` segment. Identity is everything up to
//! and including the check id; the service only rides along in the path.
//! Segments are percent-encoded, so ids containing `/` still read back.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::Serialize;

use crate::types::{CheckObservation, HealthState};

/// Characters escaped inside one key segment.
const SEGMENT: &AsciiSet = &CONTROLS.add(b'/').add(b'%');

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Parsed form of a problem record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProblemKey {
    pub class: HealthState,
    pub datacenter: String,
    pub node: String,
    pub check_id: String,
    pub service: Option<String>,
}

/// Why a stored key could not be read back as a [`ProblemKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key {0:?} is outside namespace {1:?}")]
    Namespace(String, String),

    #[error("key {0:?} has too few segments")]
    TooShort(String),

    #[error("key {0:?} has too many segments")]
    TooLong(String),

    #[error("key {0:?} has an unrecognized class")]
    Class(String),

    #[error("key {0:?} has an empty segment")]
    EmptySegment(String),

    #[error("key {0:?} has a segment that is not valid utf-8 once decoded")]
    Encoding(String),
}

impl ProblemKey {
    /// Key for an observation reported under `class`.
    pub fn for_observation(class: HealthState, obs: &CheckObservation) -> Self {
        Self {
            class,
            datacenter: obs.datacenter.clone(),
            node: obs.node.clone(),
            check_id: obs.check_id.clone(),
            service: obs.service.clone(),
        }
    }

    /// Prefix under which every record of `class` is stored, with a
    /// trailing slash so that `warning` never matches `warning-foo`.
    pub fn class_prefix(prefix: &str, class: HealthState) -> String {
        format!("{prefix}/{class}/")
    }

    /// Full store path for this record.
    pub fn path(&self, prefix: &str) -> String {
        let mut path = format!(
            "{prefix}/{}/{}/{}/{}",
            self.class,
            encode(&self.datacenter),
            encode(&self.node),
            encode(&self.check_id)
        );
        if let Some(service) = self.service.as_deref().filter(|s| !s.is_empty()) {
            path.push('/');
            path.push_str(&encode(service));
        }
        path
    }

    /// Parse a stored key that should live under `prefix`.
    pub fn parse(prefix: &str, key: &str) -> Result<Self, KeyError> {
        let rest = key
            .strip_prefix(prefix)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| KeyError::Namespace(key.to_string(), prefix.to_string()))?;

        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() < 4 {
            return Err(KeyError::TooShort(key.to_string()));
        }
        if segments.len() > 5 {
            return Err(KeyError::TooLong(key.to_string()));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(KeyError::EmptySegment(key.to_string()));
        }

        let class = segments[0]
            .parse::<HealthState>()
            .map_err(|_| KeyError::Class(key.to_string()))?;

        let decode = |segment: &str| {
            percent_decode_str(segment)
                .decode_utf8()
                .map(|s| s.into_owned())
                .map_err(|_| KeyError::Encoding(key.to_string()))
        };

        Ok(Self {
            class,
            datacenter: decode(segments[1])?,
            node: decode(segments[2])?,
            check_id: decode(segments[3])?,
            service: segments.get(4).copied().map(decode).transpose()?,
        })
    }
}

impl fmt::Display for ProblemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.class, self.datacenter, self.node, self.check_id
        )
    }
}
