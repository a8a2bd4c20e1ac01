//! Read path.

use futures::{StreamExt, TryStreamExt};
use tracing::{debug, instrument, warn};

use super::{structure_key_id, SlicePipeline};
use crate::crypto::aes::TAG_LEN;
use crate::crypto::hash::sha256;
use crate::engine::Handles;
use crate::error::{Error, Result};
use crate::ledger::{unix_nanos, File, FileStructure, PrivateSliceMeta, PublicSliceMeta};
use crate::peer::PullRequest;

/// Decrypt the private structure of a file.
pub fn open_structure(h: &Handles, file: &File) -> Result<FileStructure> {
    let raw = h
        .encryptor
        .decrypt_file(&structure_key_id(&file.id), &file.structure)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Pull one replica and check its length and cipher hash.
pub async fn pull_replica(h: &Handles, file: &File, meta: &PublicSliceMeta) -> Result<Vec<u8>> {
    let node = h.ledger.get_node(&meta.node_id).await?;
    let req = PullRequest::sign(
        &h.identity.signer,
        &meta.slice_id,
        &file.id,
        unix_nanos(),
    )?;
    let data = h.copier.pull(&node, &req).await?;
    if data.len() as u64 != meta.length {
        return Err(Error::crypto(format!(
            "slice {} from {} has length {}, expected {}",
            meta.slice_id,
            meta.node_id,
            data.len(),
            meta.length
        )));
    }
    if sha256(&data).as_slice() != meta.cipher_hash.as_slice() {
        return Err(Error::crypto(format!(
            "slice {} from {} does not match its cipher hash",
            meta.slice_id, meta.node_id
        )));
    }
    Ok(data)
}

/// Plaintext of a slice from the first holder, in listed order, that
/// yields a verifying copy. `skip` holders are not tried.
pub async fn fetch_slice(
    h: &Handles,
    file: &File,
    slice: &PrivateSliceMeta,
    skip: &[&str],
) -> Result<Vec<u8>> {
    for meta in file
        .slices
        .iter()
        .filter(|m| m.slice_id == slice.slice_id && !skip.contains(&m.node_id.as_str()))
    {
        let attempt = async {
            let cipher = pull_replica(h, file, meta).await?;
            let plain = h
                .encryptor
                .decrypt_slice(&file.id, &meta.slice_id, &meta.node_id, &cipher)?;
            if sha256(&plain).as_slice() != slice.plain_hash.as_slice() {
                return Err(Error::crypto("plaintext hash mismatch"));
            }
            Ok(plain)
        };
        match attempt.await {
            Ok(plain) => return Ok(plain),
            Err(e) => {
                warn!(slice_id = %meta.slice_id, node_id = %meta.node_id, error = %e, "holder failed, trying next");
            }
        }
    }
    Err(Error::not_found(format!(
        "no holder returned slice {}",
        slice.slice_id
    )))
}

impl SlicePipeline {
    /// Read a file of the calling owner. Expired files stay readable through
    /// the retention window.
    #[instrument(skip(self), fields(namespace = %namespace, name = %name))]
    pub async fn read(&self, namespace: &str, name: &str) -> Result<Vec<u8>> {
        let h = &self.handles;
        let owner = h.identity.id();
        let file = h
            .ledger
            .get_file_by_name(&owner, namespace, name, unix_nanos() - h.retention_ns)
            .await?;
        self.read_file(&file).await
    }

    /// Reassemble and decrypt a file record.
    #[instrument(skip(self, file), fields(file_id = %file.id))]
    pub async fn read_file(&self, file: &File) -> Result<Vec<u8>> {
        let h = &self.handles;
        if file.owner != h.identity.id() {
            return Err(Error::not_authorized("file belongs to another owner"));
        }
        let structure = open_structure(h, file)?;

        let parts: Vec<Vec<u8>> = futures::stream::iter(structure.slices.iter())
            .map(|slice| fetch_slice(h, file, slice, &[]))
            .buffered(self.config.read_window.max(1))
            .try_collect()
            .await?;

        let mut joined = parts.concat();
        let cipher_len = file.length as usize + TAG_LEN;
        if joined.len() < cipher_len {
            return Err(Error::crypto(format!(
                "reassembled {} bytes, expected at least {}",
                joined.len(),
                cipher_len
            )));
        }
        joined.truncate(cipher_len);
        let plain = h.encryptor.decrypt_file(&file.id, &joined)?;
        debug!(len = plain.len(), slices = structure.slices.len(), "file read");
        Ok(plain)
    }
}
