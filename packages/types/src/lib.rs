//! Shared types and re-exports for the histofuse crates.
//!
//! Keeps the error, imaging and serialization stack pinned to one set of
//! versions so the core, the model provider and the apps agree on them.

pub use ::anyhow::{self, Context, Error, Result, anyhow, bail};
pub use image;
pub use imageproc;
pub use rand;
pub use schemars::{self, JsonSchema};

pub mod utils;

pub mod json {
    pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
    pub use serde_json::{
        Value, from_slice, from_str, from_value, json, to_string, to_string_pretty, to_value,
        to_vec,
    };
}

pub use serde_json::Value;

#[cfg(test)]
mod tests {
    use super::{Context, Result, anyhow, bail};

    fn parse_port(raw: &str) -> Result<u16> {
        if raw.is_empty() {
            bail!("empty port");
        }
        raw.parse().context("port is not a number")
    }

    #[test]
    fn error_reexports_resolve() {
        assert_eq!(parse_port("8501").unwrap(), 8501);
        assert_eq!(parse_port("").unwrap_err().to_string(), "empty port");

        let err: super::anyhow::Error = anyhow!("backbone missing");
        let wrapped: super::Error = Err::<(), _>(err).context("loading").unwrap_err();
        assert_eq!(wrapped.chain().count(), 2);
    }
}
