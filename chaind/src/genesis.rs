//! Genesis data file (section 6): a JSON list of `(space, key,
//! value_bytes)` entries installed into the root state node on first
//! open. The chain id is the hash of the whole bundle, persisted under
//! `reserved_space::CHAIN_METADATA`/`reserved_key::CHAIN_ID` the first
//! time the database is opened (section 6, "the chain id is computed as
//! the hash of the entire genesis bundle and persisted on first open").

use std::path::Path;
use std::sync::Arc;

use serde_tuple::{Deserialize_tuple, Serialize_tuple};

use chain_engine::backend::Backend;
use chain_engine::node::StateNode;
use chain_types::{
    object::{reserved_key, reserved_space},
    ChainError, Id, ObjectSpace,
};

/// Each entry is encoded as a bare `[space, key, value]` JSON array rather
/// than an object, matching section 6's literal `(space, key, value_bytes)`
/// tuple wording for the genesis bundle.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct GenesisEntry {
    pub space: ObjectSpace,
    #[serde(with = "hex_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
}

pub fn load_bundle(path: &Path) -> anyhow::Result<Vec<GenesisEntry>> {
    let raw = std::fs::read_to_string(path)?;
    let entries: Vec<GenesisEntry> = serde_json::from_str(&raw)?;
    if !entries.iter().any(|e| {
        e.space.system
            && e.space.id == reserved_space::CHAIN_METADATA
            && e.key == reserved_key::GENESIS_PUBLIC_KEY
    }) {
        anyhow::bail!(ChainError::MissingField("genesis_public_key"));
    }
    Ok(entries)
}

/// Installs `bundle` into `root` and stamps the chain id. Passed as the
/// `genesis` closure to [`chain_engine::fork_db::ForkDb::open`]/`reset`,
/// which only invokes it the first time the backend has no recorded root.
pub fn install<B: Backend>(root: &Arc<StateNode<B>>, bundle: &[GenesisEntry]) -> anyhow::Result<()> {
    for entry in bundle {
        root.put(&entry.space, &entry.key, entry.value.clone())?;
    }
    let bytes = chain_types::encoding::canonical_serialize(bundle)?;
    let chain_id = Id::hash(&bytes);
    root.put(
        &ObjectSpace::system(reserved_space::CHAIN_METADATA),
        reserved_key::CHAIN_ID,
        chain_id.to_bytes(),
    )?;
    log::info!("installed genesis bundle of {} entries, chain id {chain_id}", bundle.len());
    Ok(())
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
