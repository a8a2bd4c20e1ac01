//! End-to-end scenarios over an in-process fleet.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use assert_matches::assert_matches;
use provestor::crypto::ecdsa::PrivateKey;
use provestor::crypto::pdp::Algorithm;
use provestor::error::ErrorKind;
use provestor::ledger::{
    unix_nanos, ChallengeAnswerOptions, ChallengePayload, ChallengeRequestOptions, ChallengeStatus,
    GetMigrateRecordsOptions, LedgerGateway, PublishFileOptions, UpdateExpireTimeOptions,
    NANOS_PER_MINUTE,
};
use provestor::peer::PullRequest;
use tokio_test::{assert_err, assert_ok};

use common::{config, random_bytes, FaultyLedger, Fleet, DAY};

const MIB: usize = 1024 * 1024;

// =============================================================================
// Write / read
// =============================================================================

#[tokio::test]
async fn test_write_read_five_mb_three_replicas() {
    let fleet = Fleet::new(5, config(Algorithm::Merkle, 4 * MIB)).await;
    fleet.owner.add_ns("docs", "", 3).await.unwrap();

    let data = random_bytes(5 * MIB);
    let file = fleet.write("docs", "big.bin", &data, DAY).await;

    let distinct = file.distinct_slice_ids();
    assert_eq!(distinct.len(), 2);
    assert_eq!(file.slices.len(), 3 * distinct.len());
    for sid in &distinct {
        let holders: HashSet<&str> = file
            .slices
            .iter()
            .filter(|m| &m.slice_id == sid)
            .map(|m| m.node_id.as_str())
            .collect();
        assert_eq!(holders.len(), 3, "slice {} must sit on 3 distinct peers", sid);
    }

    let listed = fleet.owner.list_files("docs").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, file.id);

    let back = fleet.owner.read("docs", "big.bin").await.unwrap();
    assert_eq!(back.len(), data.len());
    assert!(back == data);
}

#[tokio::test]
async fn test_write_needs_enough_peers() {
    let fleet = Fleet::new(2, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 3).await.unwrap();
    let err = fleet
        .owner
        .write(
            b"hello",
            provestor::pipeline::WriteOptions {
                namespace: "docs".into(),
                name: "a".into(),
                description: String::new(),
                expire_time: unix_nanos() + DAY,
                algorithm: None,
            },
            &tokio_util::sync::CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound), "{}", err);
    assert!(fleet.owner.list_files("docs").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_write_relocates_from_unreachable_peer() {
    let fleet = Fleet::new(4, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 3).await.unwrap();
    let dead = fleet.peers[0].id();
    fleet.copier.set_unreachable(&dead, true);

    let data = random_bytes(3000);
    let file = fleet.write("docs", "a", &data, DAY).await;
    assert!(file.slices.iter().all(|m| m.node_id != dead));
    assert_eq!(fleet.owner.read("docs", "a").await.unwrap(), data);
}

#[tokio::test]
async fn test_read_survives_corrupt_replica() {
    let fleet = Fleet::new(3, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 2).await.unwrap();
    let data = random_bytes(2500);
    let file = fleet.write("docs", "a", &data, DAY).await;

    let first = &file.slices[0];
    let holder = fleet.peer_index(&first.node_id);
    assert!(fleet.peers[holder]
        .storage
        .tamper(&first.slice_id, |b| b[0] ^= 0xff));

    assert_eq!(fleet.owner.read("docs", "a").await.unwrap(), data);
}

// =============================================================================
// Challenges
// =============================================================================

#[tokio::test]
async fn test_pairing_challenge_detects_corruption() {
    let fleet = Fleet::new(1, config(Algorithm::Pairing, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let file = fleet.write("docs", "p", &random_bytes(4000), 3 * 60 * NANOS_PER_MINUTE).await;
    assert_eq!(file.slices.len(), 4);
    let idx: HashSet<u64> = file.slices.iter().map(|m| m.slice_idx).collect();
    assert_eq!(idx, HashSet::from([1, 2, 3, 4]));

    let peer = fleet.peers[0].id();
    let requester = fleet.owner.requester();
    let answerer = fleet.peer_engine(0).answerer();

    let now = unix_nanos();
    let c = requester
        .request_for(&file, &file.slices[0].slice_id, &peer, now)
        .await
        .unwrap();
    let answered = answerer.answer(&c, now).await.unwrap();
    assert_eq!(answered.status, ChallengeStatus::Proved);

    let corrupt = file
        .slices
        .iter()
        .find(|m| m.slice_idx == 2)
        .unwrap()
        .slice_id
        .clone();
    assert!(fleet.peers[0].storage.tamper(&corrupt, |b| b[7] ^= 0x01));

    let mut saw_failed = false;
    for _ in 0..40 {
        let now = unix_nanos();
        let c = requester
            .request_for(&file, &file.slices[0].slice_id, &peer, now)
            .await
            .unwrap();
        let touches = matches!(&c.payload, ChallengePayload::Pairing { slice_ids, .. } if slice_ids.contains(&corrupt));
        let status = answerer.answer(&c, now).await.unwrap().status;
        if touches {
            assert_eq!(status, ChallengeStatus::Failed);
            saw_failed = true;
            break;
        }
        assert_eq!(status, ChallengeStatus::Proved);
    }
    assert!(saw_failed);
}

#[tokio::test]
async fn test_merkle_challenges_never_reuse_material() {
    let fleet = Fleet::new(1, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let file = fleet.write("docs", "m", &random_bytes(600), DAY).await;
    let meta = &file.slices[0];
    let requester = fleet.owner.requester();
    let answerer = fleet.peer_engine(0).answerer();

    let material = &fleet.owner.handles().material;
    let available = material
        .unused(&file.id, &meta.slice_id, &meta.node_id)
        .await
        .unwrap();
    assert!(available > 1);

    let mut seen = HashSet::new();
    for i in 0..available {
        let now = unix_nanos();
        let c = requester
            .request_for(&file, &meta.slice_id, &meta.node_id, now)
            .await
            .unwrap();
        let ChallengePayload::Merkle { ranges, .. } = &c.payload else {
            panic!("expected a merkle challenge");
        };
        assert!(seen.insert(ranges.clone()), "ranges reused");
        if i < 3 {
            let answered = answerer.answer(&c, now).await.unwrap();
            assert_eq!(answered.status, ChallengeStatus::Proved);
        }
    }

    let err = assert_err!(
        requester
            .request_for(&file, &meta.slice_id, &meta.node_id, unix_nanos())
            .await
    );
    assert!(err.is(ErrorKind::NotFound), "{}", err);
}

#[tokio::test]
async fn test_merkle_challenge_fails_on_corruption() {
    let fleet = Fleet::new(1, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let file = fleet.write("docs", "m", &random_bytes(600), DAY).await;
    let meta = &file.slices[0];
    fleet.peers[0].storage.tamper(&meta.slice_id, |b| {
        for x in b.iter_mut() {
            *x ^= 0x55;
        }
    });

    let now = unix_nanos();
    let c = fleet
        .owner
        .requester()
        .request_for(&file, &meta.slice_id, &meta.node_id, now)
        .await
        .unwrap();
    let answered = fleet.peer_engine(0).answerer().answer(&c, now).await.unwrap();
    assert_eq!(answered.status, ChallengeStatus::Failed);
}

#[tokio::test]
async fn test_answer_pending_and_replay() {
    let fleet = Fleet::new(1, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    fleet.write("docs", "m", &random_bytes(600), DAY).await;

    let c = fleet
        .owner
        .requester()
        .request_once(unix_nanos())
        .await
        .unwrap()
        .expect("a live file to challenge");
    let answerer = fleet.peer_engine(0).answerer();
    assert_eq!(answerer.answer_pending(unix_nanos()).await.unwrap(), 1);
    assert_eq!(answerer.answer_pending(unix_nanos()).await.unwrap(), 0);

    let stored = fleet.ledger.get_challenge_by_id(&c.id).await.unwrap();
    assert_eq!(stored.status, ChallengeStatus::Proved);
    let err = answerer.answer(&stored, unix_nanos()).await.unwrap_err();
    assert!(err.is(ErrorKind::AlreadyExists));
}

#[tokio::test]
async fn test_replayed_ledger_writes_change_nothing() {
    let fleet = Fleet::new(1, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let file = fleet.write("docs", "m", &random_bytes(600), DAY).await;
    let owner = &fleet.owner.handles().identity;

    let stored = fleet.file(&file.id).await;
    let err = fleet
        .ledger
        .publish_file(PublishFileOptions {
            signature: owner.sign(&serde_json::to_vec(&stored).unwrap()).unwrap(),
            file: stored,
        })
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::AlreadyExists));
    assert_eq!(fleet.owner.get_ns("docs").await.unwrap().file_total_num, 1);

    let meta = &file.slices[0];
    let now = unix_nanos();
    let c = fleet
        .owner
        .requester()
        .request_for(&file, &meta.slice_id, &meta.node_id, now)
        .await
        .unwrap();
    let err = fleet
        .ledger
        .challenge_request(ChallengeRequestOptions {
            signature: owner.sign(&serde_json::to_vec(&c).unwrap()).unwrap(),
            challenge: c.clone(),
        })
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::AlreadyExists));

    let answered = fleet.peer_engine(0).answerer().answer(&c, now).await.unwrap();
    assert_eq!(answered.status, ChallengeStatus::Proved);
    let peer = &fleet.peers[0].identity;
    let proof = answered.proof.clone().unwrap();
    let err = fleet
        .ledger
        .challenge_answer(ChallengeAnswerOptions {
            challenge_id: c.id.clone(),
            signature: peer.sign(&proof.sign_message(&c.id).unwrap()).unwrap(),
            proof,
            answer_time: now,
        })
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::AlreadyExists));
    assert_eq!(
        fleet.ledger.get_challenge_by_id(&c.id).await.unwrap(),
        answered
    );
}

// =============================================================================
// Maintenance
// =============================================================================

#[tokio::test]
async fn test_migration_moves_off_red_peer() {
    let fleet = Fleet::new(4, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let data = random_bytes(4500);
    let file = fleet.write("docs", "m", &data, DAY).await;
    assert_eq!(file.distinct_slice_ids().len(), 5);

    let red = file.slices[0].node_id.clone();
    let on_red = file.slices.iter().filter(|m| m.node_id == red).count();
    fleet.set_offline(fleet.peer_index(&red)).await;

    let report = fleet.owner.migrator().migrate_all(unix_nanos()).await.unwrap();
    assert_eq!(report.migrated, on_red);
    assert_eq!(report.failed, 0);

    let moved = fleet.file(&file.id).await;
    assert_eq!(moved.slices.len(), 5);
    assert!(moved.slices.iter().all(|m| m.node_id != red));

    let records = fleet
        .ledger
        .get_slice_migrate_records(GetMigrateRecordsOptions {
            node_id: red.clone(),
            time_start: 0,
            time_end: 0,
            limit: 0,
        })
        .await
        .unwrap();
    assert_eq!(records.len(), on_red);
    assert!(records.iter().all(|r| r.file_id == file.id));

    // Material for the vacated peer is gone, the new holders have theirs.
    let material = &fleet.owner.handles().material;
    for m in file.slices.iter().filter(|m| m.node_id == red) {
        assert_eq!(material.unused(&file.id, &m.slice_id, &red).await.unwrap(), 0);
    }
    for m in &moved.slices {
        assert!(material.unused(&file.id, &m.slice_id, &m.node_id).await.unwrap() > 0);
    }

    assert_eq!(fleet.owner.read("docs", "m").await.unwrap(), data);

    // Moved replicas are challengeable on their new peer.
    let meta = moved.slices.iter().find(|m| m.slice_id == file.slices[0].slice_id).unwrap();
    let now = unix_nanos();
    let c = fleet
        .owner
        .requester()
        .request_for(&moved, &meta.slice_id, &meta.node_id, now)
        .await
        .unwrap();
    let answered = fleet
        .peer_engine(fleet.peer_index(&meta.node_id))
        .answerer()
        .answer(&c, now)
        .await
        .unwrap();
    assert_eq!(answered.status, ChallengeStatus::Proved);
}

#[tokio::test]
async fn test_failed_meta_update_keeps_vacated_material() {
    let fleet = Fleet::new(4, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let data = random_bytes(4500);
    let file = fleet.write("docs", "m", &data, DAY).await;

    let red = file.slices[0].node_id.clone();
    let on_red: Vec<String> = file
        .slices
        .iter()
        .filter(|m| m.node_id == red)
        .map(|m| m.slice_id.clone())
        .collect();
    fleet.set_offline(fleet.peer_index(&red)).await;

    let ledger = Arc::new(FaultyLedger::new(fleet.ledger.clone()));
    ledger.fail_slice_meta(true);
    let owner = fleet.owner_via(ledger.clone());
    let report = owner.migrator().migrate_all(unix_nanos()).await.unwrap();
    assert_eq!(report.migrated, 0);
    assert_eq!(report.failed, 1);

    // The ledger still points at the red peer, and so does the material.
    let placement = |f: &provestor::ledger::File| -> HashSet<(String, String)> {
        f.slices
            .iter()
            .map(|m| (m.slice_id.clone(), m.node_id.clone()))
            .collect()
    };
    let unchanged = fleet.file(&file.id).await;
    assert_eq!(placement(&unchanged), placement(&file));
    let material = &owner.handles().material;
    for sid in &on_red {
        assert!(material.unused(&file.id, sid, &red).await.unwrap() > 0);
    }

    assert_eq!(fleet.owner.read("docs", "m").await.unwrap(), data);
}

#[tokio::test]
async fn test_one_failed_push_does_not_stop_other_moves() {
    let fleet = Fleet::new(2, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let data = random_bytes(4500);
    let file = fleet.write("docs", "m", &data, DAY).await;
    assert_eq!(file.distinct_slice_ids().len(), 5);

    // The busier peer holds at least three of the five slices.
    let red = fleet
        .peers
        .iter()
        .map(|p| p.id())
        .max_by_key(|id| file.slices.iter().filter(|m| &m.node_id == id).count())
        .unwrap();
    let on_red: Vec<String> = file
        .slices
        .iter()
        .filter(|m| m.node_id == red)
        .map(|m| m.slice_id.clone())
        .collect();
    assert!(on_red.len() >= 3);
    fleet.set_offline(fleet.peer_index(&red)).await;

    let stuck = on_red[1].clone();
    fleet.copier.set_push_refused(&stuck, true);
    let report = fleet.owner.migrator().migrate_all(unix_nanos()).await.unwrap();
    assert_eq!(report.migrated, on_red.len() - 1);
    assert_eq!(report.failed, 1);

    let moved = fleet.file(&file.id).await;
    assert_eq!(moved.slices.len(), 5);
    let material = &fleet.owner.handles().material;
    for sid in &on_red {
        let holder = &moved.slices.iter().find(|m| &m.slice_id == sid).unwrap().node_id;
        let left = material.unused(&file.id, sid, &red).await.unwrap();
        if *sid == stuck {
            assert_eq!(holder, &red);
            assert!(left > 0);
        } else {
            assert_ne!(holder, &red);
            assert_eq!(left, 0);
        }
    }
    assert_eq!(fleet.owner.read("docs", "m").await.unwrap(), data);

    // The next tick finishes the job.
    fleet.copier.set_push_refused(&stuck, false);
    let report = fleet.owner.migrator().migrate_all(unix_nanos()).await.unwrap();
    assert_eq!(report.migrated, 1);
    assert!(fleet.file(&file.id).await.slices.iter().all(|m| m.node_id != red));
}

#[tokio::test]
async fn test_unpublished_challenge_keeps_material() {
    let fleet = Fleet::new(2, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let file = fleet.write("docs", "c", &random_bytes(2000), DAY).await;
    let meta = &file.slices[0];

    let ledger = Arc::new(FaultyLedger::new(fleet.ledger.clone()));
    let owner = fleet.owner_via(ledger.clone());
    let material = &owner.handles().material;
    let before = material
        .unused(&file.id, &meta.slice_id, &meta.node_id)
        .await
        .unwrap();
    assert!(before > 0);

    ledger.fail_challenge_request(true);
    let now = unix_nanos();
    assert_err!(
        owner
            .requester()
            .request_for(&file, &meta.slice_id, &meta.node_id, now)
            .await
    );
    assert_eq!(
        material
            .unused(&file.id, &meta.slice_id, &meta.node_id)
            .await
            .unwrap(),
        before
    );

    ledger.fail_challenge_request(false);
    assert_ok!(
        owner
            .requester()
            .request_for(&file, &meta.slice_id, &meta.node_id, now)
            .await
    );
    assert_eq!(
        material
            .unused(&file.id, &meta.slice_id, &meta.node_id)
            .await
            .unwrap(),
        before - 1
    );
}

#[tokio::test]
async fn test_replica_expansion() {
    let fleet = Fleet::new(4, config(Algorithm::Pairing, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let data = random_bytes(2000);
    let file = fleet.write("docs", "e", &data, 2 * 60 * NANOS_PER_MINUTE).await;
    let distinct = file.distinct_slice_ids().len();

    fleet.owner.update_ns_replica("docs", 3).await.unwrap();
    let report = fleet.owner.migrator().migrate_all(unix_nanos()).await.unwrap();
    assert_eq!(report.expanded, 2 * distinct);

    let expanded = fleet.file(&file.id).await;
    assert_eq!(expanded.slices.len(), 3 * distinct);
    for sid in expanded.distinct_slice_ids() {
        let holders: HashSet<&str> = expanded
            .slices
            .iter()
            .filter(|m| m.slice_id == sid)
            .map(|m| m.node_id.as_str())
            .collect();
        assert_eq!(holders.len(), 3);
    }
    // sliceIdx stays unique per peer.
    for peer in &fleet.peers {
        let idx: Vec<u64> = expanded
            .slices
            .iter()
            .filter(|m| m.node_id == peer.id())
            .map(|m| m.slice_idx)
            .collect();
        let unique: HashSet<u64> = idx.iter().copied().collect();
        assert_eq!(idx.len(), unique.len());
    }

    // A second pass has nothing left to do.
    let again = fleet.owner.migrator().migrate_all(unix_nanos()).await.unwrap();
    assert_eq!(again.expanded + again.migrated, 0);

    assert_eq!(fleet.owner.read("docs", "e").await.unwrap(), data);
}

#[tokio::test]
async fn test_reaper_deletes_after_retention() {
    let fleet = Fleet::new(2, config(Algorithm::Pairing, 1024)).await;
    fleet.owner.add_ns("docs", "", 2).await.unwrap();
    let file = fleet.write("docs", "r", &random_bytes(1500), 2 * 60 * NANOS_PER_MINUTE).await;
    assert!(!fleet.peers[0].storage.is_empty());

    let reaper = fleet.peer_engine(0).reaper();
    assert_eq!(reaper.reap(unix_nanos()).await.unwrap(), 0);

    let later = file.expire_time + provestor::ledger::DEFAULT_RETENTION_NS + 1;
    let deleted = reaper.reap(later).await.unwrap();
    assert_eq!(deleted, file.distinct_slice_ids().len());
    assert!(fleet.peers[0].storage.is_empty(), "slices and sigma tables are gone");
    assert!(!fleet.peers[1].storage.is_empty());
}

#[tokio::test]
async fn test_heartbeat_replay_does_not_count_twice() {
    let fleet = Fleet::new(1, config(Algorithm::Merkle, 1024)).await;
    let hb = fleet.peer_engine(0).heartbeater();
    let now = unix_nanos();
    assert_ok!(hb.beat(now).await);
    assert_ok!(hb.beat(now).await);
    let n = fleet
        .ledger
        .get_heartbeat_num(&fleet.peers[0].id(), now - DAY, now + DAY)
        .await
        .unwrap();
    assert_eq!(n, 1);
}

#[tokio::test]
async fn test_ns_cap_updater() {
    let fleet = Fleet::new(1, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    fleet.write("docs", "a", &random_bytes(100), DAY).await;
    let updater = fleet.owner.ns_cap_updater();
    // The first pass may or may not find a change; the second never does.
    updater.update(unix_nanos()).await.unwrap();
    assert_eq!(updater.update(unix_nanos()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_file_sys_health_counts_files() {
    let fleet = Fleet::new(3, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 2).await.unwrap();
    fleet.write("docs", "a", &random_bytes(1500), DAY).await;
    fleet.write("docs", "b", &random_bytes(10), DAY).await;

    let health = fleet.owner.file_sys_health().await.unwrap();
    let ns = serde_json::to_value(&health).unwrap();
    assert!(ns.to_string().contains("docs"));
    assert_eq!(fleet.owner.healthy_nodes().await.unwrap().len(), 3);
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test]
async fn test_update_expire_time() {
    let fleet = Fleet::new(1, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let file = fleet.write("docs", "x", &random_bytes(600), DAY).await;
    let meta = &file.slices[0];

    let err = fleet
        .owner
        .update_file_expire_time(&file.id, file.expire_time)
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Param));

    let material = &fleet.owner.handles().material;
    let before = material
        .unused(&file.id, &meta.slice_id, &meta.node_id)
        .await
        .unwrap();
    let extended = fleet
        .owner
        .update_file_expire_time(&file.id, file.expire_time + 2 * DAY)
        .await
        .unwrap();
    assert_eq!(extended.expire_time, file.expire_time + 2 * DAY);
    assert_eq!(fleet.file(&file.id).await.expire_time, extended.expire_time);
    let after = material
        .unused(&file.id, &meta.slice_id, &meta.node_id)
        .await
        .unwrap();
    assert!(after > before, "material grows with the lifetime");

    // Past the retention window the ledger refuses.
    let owner = &fleet.owner.handles().identity;
    let late = extended.expire_time + 8 * DAY;
    let new_expire = late + DAY;
    let msg = UpdateExpireTimeOptions::message(&file.id, new_expire, late);
    let err = fleet
        .ledger
        .update_file_expire_time(UpdateExpireTimeOptions {
            file_id: file.id.clone(),
            new_expire_time: new_expire,
            current_time: late,
            signature: owner.sign(msg.as_bytes()).unwrap(),
        })
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Param));
    assert!(err.message().contains("expired over 7 days"));
}

#[tokio::test]
async fn test_pairing_expire_extension_keeps_answering() {
    let fleet = Fleet::new(1, config(Algorithm::Pairing, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let file = fleet.write("docs", "x", &random_bytes(900), 70 * NANOS_PER_MINUTE).await;
    let extended = fleet
        .owner
        .update_file_expire_time(&file.id, file.expire_time + 3 * 60 * NANOS_PER_MINUTE)
        .await
        .unwrap();

    let meta = &extended.slices[0];
    let now = unix_nanos();
    let c = fleet
        .owner
        .requester()
        .request_for(&extended, &meta.slice_id, &meta.node_id, now)
        .await
        .unwrap();
    let answered = fleet.peer_engine(0).answerer().answer(&c, now).await.unwrap();
    assert_eq!(answered.status, ChallengeStatus::Proved);
}

// =============================================================================
// Pull checks
// =============================================================================

#[tokio::test]
async fn test_pull_freshness_and_signature() {
    let fleet = Fleet::new(1, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let file = fleet.write("docs", "x", &random_bytes(100), DAY).await;
    let sid = &file.slices[0].slice_id;
    let owner = &fleet.owner.handles().identity.signer;
    let peer = &fleet.peers[0].service;

    let stale = PullRequest::sign(owner, sid, &file.id, unix_nanos() - 10 * NANOS_PER_MINUTE).unwrap();
    assert_matches!(peer.handle_pull(&stale).await, Err(e) if e.is(ErrorKind::Param));

    let stranger = PrivateKey::generate();
    let forged = PullRequest::sign(&stranger, sid, &file.id, unix_nanos()).unwrap();
    assert_matches!(peer.handle_pull(&forged).await, Err(e) if e.is(ErrorKind::BadSignature));

    let good = PullRequest::sign(owner, sid, &file.id, unix_nanos()).unwrap();
    assert_eq!(
        peer.handle_pull(&good).await.unwrap().len() as u64,
        file.slices[0].length
    );
}

#[tokio::test]
async fn test_read_by_other_owner_is_not_authorized() {
    let fleet = Fleet::new(1, config(Algorithm::Merkle, 1024)).await;
    fleet.owner.add_ns("docs", "", 1).await.unwrap();
    let file = fleet.write("docs", "x", &random_bytes(100), DAY).await;
    let other = fleet.peer_engine(0);
    let err = other.pipeline().read_file(&file).await.unwrap_err();
    assert!(err.is(ErrorKind::NotAuthorized));
}
