//! Composite key encoding for the ledger's world state.
//!
//! A key is a type prefix followed by `/`-separated fields. Free-form text
//! (names) is hex-encoded so it can never contain the separator; numbers
//! are zero-padded to 19 digits so lexical order matches numeric order.
//! Reverse-chronological indexes store `i64::MAX - t`, making a forward
//! prefix scan yield newest first.

pub const FILE: &str = "file";
pub const FILE_NAME: &str = "fileName";
pub const FILE_PUBLISH: &str = "filePublish";
pub const FILE_SLICE: &str = "fileSlice";
pub const NS: &str = "ns";
pub const NS_TIME: &str = "nsTime";
pub const NODE: &str = "node";
pub const NODE_NONCE: &str = "nodeNonce";
pub const HEARTBEAT: &str = "heartbeat";
pub const CHALLENGE: &str = "challenge";
pub const CHALLENGE_OWNER: &str = "challengeOwner";
pub const CHALLENGE_NODE: &str = "challengeNode";
pub const MIGRATE: &str = "migrate";

/// `i64::MAX - t`, for newest-first iteration.
pub fn sub_by_i64_max(t: i64) -> i64 {
    i64::MAX - t.max(0)
}

/// Fixed-width decimal.
pub fn num(n: i64) -> String {
    format!("{:019}", n.max(0))
}

fn text(s: &str) -> String {
    hex::encode(s.as_bytes())
}

/// Join `prefix` and `parts` with the separator.
pub fn compose(prefix: &str, parts: &[&str]) -> String {
    let mut key = String::from(prefix);
    for p in parts {
        key.push('/');
        key.push_str(p);
    }
    key
}

/// Scan prefix: `compose(...)` plus a trailing separator.
pub fn prefix(prefix: &str, parts: &[&str]) -> String {
    let mut key = compose(prefix, parts);
    key.push('/');
    key
}

pub fn file(file_id: &str) -> String {
    compose(FILE, &[file_id])
}

pub fn file_name(owner: &str, ns: &str, name: &str) -> String {
    compose(FILE_NAME, &[owner, &text(ns), &text(name)])
}

pub fn file_publish(owner: &str, ns: &str, publish_time: i64, file_id: &str) -> String {
    compose(
        FILE_PUBLISH,
        &[owner, &text(ns), &num(sub_by_i64_max(publish_time)), file_id],
    )
}

pub fn file_publish_prefix(owner: &str, ns: &str) -> String {
    prefix(FILE_PUBLISH, &[owner, &text(ns)])
}

/// Per-node slice index ordered by expiry, oldest first.
pub fn file_slice(node_id: &str, expire_time: i64, file_id: &str) -> String {
    compose(FILE_SLICE, &[node_id, &num(expire_time), file_id])
}

pub fn file_slice_prefix(node_id: &str) -> String {
    prefix(FILE_SLICE, &[node_id])
}

pub fn ns(owner: &str, name: &str) -> String {
    compose(NS, &[owner, &text(name)])
}

pub fn ns_time(owner: &str, create_time: i64, name: &str) -> String {
    compose(NS_TIME, &[owner, &num(sub_by_i64_max(create_time)), &text(name)])
}

pub fn ns_time_prefix(owner: &str) -> String {
    prefix(NS_TIME, &[owner])
}

pub fn node(node_id: &str) -> String {
    compose(NODE, &[node_id])
}

pub fn node_prefix() -> String {
    prefix(NODE, &[])
}

pub fn node_nonce(node_id: &str, nonce: i64) -> String {
    compose(NODE_NONCE, &[node_id, &nonce.to_string()])
}

/// One heartbeat bucket per node per UTC day.
pub fn heartbeat(node_id: &str, day_start: i64) -> String {
    compose(HEARTBEAT, &[node_id, &num(day_start)])
}

pub fn heartbeat_prefix(node_id: &str) -> String {
    prefix(HEARTBEAT, &[node_id])
}

pub fn challenge(challenge_id: &str) -> String {
    compose(CHALLENGE, &[challenge_id])
}

pub fn challenge_owner(owner: &str, time: i64, challenge_id: &str) -> String {
    compose(
        CHALLENGE_OWNER,
        &[owner, &num(sub_by_i64_max(time)), challenge_id],
    )
}

pub fn challenge_owner_prefix(owner: &str) -> String {
    prefix(CHALLENGE_OWNER, &[owner])
}

pub fn challenge_node(node_id: &str, time: i64, challenge_id: &str) -> String {
    compose(
        CHALLENGE_NODE,
        &[node_id, &num(sub_by_i64_max(time)), challenge_id],
    )
}

pub fn challenge_node_prefix(node_id: &str) -> String {
    prefix(CHALLENGE_NODE, &[node_id])
}

pub fn migrate(node_id: &str, ctime: i64, file_id: &str, slice_id: &str) -> String {
    compose(
        MIGRATE,
        &[node_id, &num(sub_by_i64_max(ctime)), file_id, slice_id],
    )
}

pub fn migrate_prefix(node_id: &str) -> String {
    prefix(MIGRATE, &[node_id])
}

/// Decode the time field written by a reverse-chronological index.
pub fn parse_reverse_time(field: &str) -> Option<i64> {
    field.parse::<i64>().ok().map(|v| i64::MAX - v)
}
