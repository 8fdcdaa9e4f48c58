use anyhow::{Result, bail};

/// Leading bytes of every index file written by this crate
pub const INDEX_MAGIC: &[u8; 4] = b"CSIX";

/// Get the bincode configuration
fn get_config() -> impl bincode::config::Config {
    // Limit allocation to prevent memory exhaustion on corrupt data
    bincode::config::legacy().with_limit::<{ 64 * 1024 * 1024 }>()
}

/// Serialize data using bincode v2.0 with serde
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn serialize<T: serde::Serialize>(data: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(data, get_config()).map_err(Into::into)
}

/// Deserialize data using bincode v2.0 with serde
///
/// # Errors
///
/// Returns an error if:
/// - Deserialization fails
/// - Data is malformed or incompatible
pub fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (result, _bytes_read) = bincode::serde::decode_from_slice(bytes, get_config())?;
    Ok(result)
}

/// Serialize `data` behind the index file magic.
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn encode_index<T: serde::Serialize>(data: &T) -> Result<Vec<u8>> {
    let mut bytes = INDEX_MAGIC.to_vec();
    bytes.extend(serialize(data)?);
    Ok(bytes)
}

/// Check the index file magic and deserialize the rest.
///
/// # Errors
///
/// Returns an error if the magic is missing or the payload is malformed
pub fn decode_index<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let Some(payload) = bytes.strip_prefix(INDEX_MAGIC.as_slice()) else {
        bail!("not an index file (bad header)");
    };
    deserialize(payload)
}
