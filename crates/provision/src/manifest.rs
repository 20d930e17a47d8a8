//! Manifest loading
//!
//! A manifest is an ordered list of flat user records. Two encodings are
//! accepted:
//!
//! ```toml
//! [[user]]
//! username = "alice"
//! id = "2001"
//! public_key = "ssh-ed25519 AAAA..."
//! systemd_limits = """
//! [Slice]
//! MemoryMax=2G
//! """
//! state = "present"
//! ```
//!
//! or a YAML or JSON list of the same records:
//!
//! ```yaml
//! - username: alice
//!   id: "2001"
//!   public_key: ssh-ed25519 AAAA...
//!   systemd_limits: |
//!     [Slice]
//!     MemoryMax=2G
//!   state: present
//! ```
//!
//! `resource_limits` is accepted as an alias of `systemd_limits`, and unknown
//! keys are ignored.

use crate::error::DecodeError;
use crate::types::{DesiredState, UserIntent};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Encoding of a manifest file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Toml,
    Yaml,
    Json,
}

impl ManifestFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }

    /// Detect format from a file extension. `None` when unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.extension().to_uppercase())
    }
}

/// Numeric ids may be written as integers or integer strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    username: String,
    id: RawId,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default, alias = "resource_limits")]
    systemd_limits: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    user: Vec<RawRecord>,
}

/// Decode manifest bytes in the given format.
pub fn load(bytes: &[u8], format: ManifestFormat) -> Result<Vec<UserIntent>, DecodeError> {
    let records = match format {
        ManifestFormat::Toml => decode_toml(bytes)?,
        ManifestFormat::Yaml => decode_yaml(bytes)?,
        ManifestFormat::Json => decode_json(bytes)?,
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| validate(index, record))
        .collect()
}

/// Read and decode a manifest file.
///
/// The format comes from the extension. Files with any other extension are
/// tried as TOML, then YAML, then JSON; the TOML error is reported if none
/// of them parse.
pub fn load_path(path: &Path) -> Result<Vec<UserIntent>, DecodeError> {
    let bytes = fs::read(path).map_err(|source| DecodeError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    match ManifestFormat::from_path(path) {
        Some(format) => load(&bytes, format),
        None => sniff(&bytes, path),
    }
}

fn sniff(bytes: &[u8], path: &Path) -> Result<Vec<UserIntent>, DecodeError> {
    let toml_err = match load(bytes, ManifestFormat::Toml) {
        Err(e @ DecodeError::Syntax { .. }) => e,
        other => return other,
    };

    log::debug!("{} is not TOML: {}", path.display(), toml_err);
    for format in [ManifestFormat::Yaml, ManifestFormat::Json] {
        match load(bytes, format) {
            Err(e @ DecodeError::Syntax { .. }) => {
                log::debug!("{} is not {}: {}", path.display(), format, e);
            }
            other => return other,
        }
    }

    Err(toml_err)
}

fn decode_toml(bytes: &[u8]) -> Result<Vec<RawRecord>, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::Syntax {
        format: ManifestFormat::Toml,
        message: format!("not valid UTF-8: {e}"),
    })?;

    let manifest: RawManifest = toml::from_str(text).map_err(|e| DecodeError::Syntax {
        format: ManifestFormat::Toml,
        message: e.to_string(),
    })?;

    Ok(manifest.user)
}

fn decode_yaml(bytes: &[u8]) -> Result<Vec<RawRecord>, DecodeError> {
    let syntax = |e: serde_yaml::Error| DecodeError::Syntax {
        format: ManifestFormat::Yaml,
        message: e.to_string(),
    };

    let value: serde_yaml::Value = serde_yaml::from_slice(bytes).map_err(syntax)?;
    match value {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Sequence(_) => serde_yaml::from_value(value).map_err(syntax),
        _ => {
            let manifest: RawManifest = serde_yaml::from_value(value).map_err(syntax)?;
            Ok(manifest.user)
        }
    }
}

fn decode_json(bytes: &[u8]) -> Result<Vec<RawRecord>, DecodeError> {
    let syntax = |e: serde_json::Error| DecodeError::Syntax {
        format: ManifestFormat::Json,
        message: e.to_string(),
    };

    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(syntax)?;
    if value.is_array() {
        serde_json::from_value(value).map_err(syntax)
    } else {
        let manifest: RawManifest = serde_json::from_value(value).map_err(syntax)?;
        Ok(manifest.user)
    }
}

fn validate(index: usize, record: RawRecord) -> Result<UserIntent, DecodeError> {
    let invalid = |message: String| DecodeError::InvalidRecord { index, message };

    if let Some(reason) = username_problem(&record.username) {
        return Err(invalid(format!("username {:?} {reason}", record.username)));
    }

    let id = match record.id {
        RawId::Int(n) => u32::try_from(n).ok(),
        RawId::Text(ref s) => s.trim().parse::<u32>().ok(),
    }
    .filter(|&id| id != u32::MAX)
    .ok_or_else(|| {
        invalid(format!(
            "id {:?} for {} is not a valid numeric id",
            record.id, record.username
        ))
    })?;

    Ok(UserIntent {
        username: record.username,
        id,
        public_key: record.public_key.unwrap_or_default(),
        resource_limits: record.systemd_limits.unwrap_or_default(),
        state: DesiredState::parse(record.state.as_deref()),
    })
}

/// Why a username cannot be handed to the account tools, if it cannot.
///
/// Names become home path components and positional arguments to
/// `groupadd` and `useradd`.
fn username_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("is empty")
    } else if name == "." || name == ".." {
        Some("is a relative path component")
    } else if name.starts_with('-') {
        Some("starts with '-'")
    } else if name.contains('/') {
        Some("contains a path separator")
    } else if name.contains(':') {
        Some("contains ':'")
    } else if name.contains('\0') {
        Some("contains a NUL byte")
    } else if name.chars().any(char::is_whitespace) {
        Some("contains whitespace")
    } else {
        None
    }
}
