//! Pure decision logic for token reconciliation.
//!
//! Nothing here performs I/O. [`Reconciler`](super::Reconciler) calls these functions between
//! remote operations so that each pass sees the token list as it stands after the previous one.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::api::models::ledger::{KeyIncrement, KeyInfoUpdate, KeyOverwrite, LedgerKeyRecord};
use crate::api::models::token::{DesiredToken, RemoteToken, TokenSpec};
use crate::types::{TokenId, to_normalized};

/// A sale token created this run whose key is not known until the list is re-fetched.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PendingSaleUpload {
    pub name: String,
    /// Intended quota in minor units
    pub quota: i64,
}

/// Ids to delete, in declaration order, each at most once.
pub fn deletions(desired: &[DesiredToken]) -> Vec<TokenId> {
    let mut seen = HashSet::new();
    desired
        .iter()
        .filter(|entry| entry.is_deleted)
        .filter_map(|entry| entry.id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Entries without an id, with the spec to create them from. Indexes point into `desired`.
pub fn creations(desired: &[DesiredToken]) -> Vec<(usize, TokenSpec)> {
    desired
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.id.is_none() && !entry.is_deleted)
        .map(|(index, entry)| (index, entry.spec()))
        .collect()
}

/// Every account keeps at least one usable token.
pub fn needs_bootstrap(remote: &[RemoteToken]) -> bool {
    remote.is_empty()
}

/// Entries carrying a positive supplement for an existing token.
pub fn supplements(desired: &[DesiredToken]) -> Vec<usize> {
    desired
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.supplement_quota > 0 && entry.id.is_some() && !entry.is_deleted)
        .map(|(index, _)| index)
        .collect()
}

/// Find the remote token a declared entry refers to.
///
/// The id is authoritative when present. Without one, the key and then the name are tried.
pub fn match_remote<'a>(entry: &DesiredToken, remote: &'a [RemoteToken]) -> Option<&'a RemoteToken> {
    if let Some(id) = entry.id {
        return remote.iter().find(|token| token.id == id);
    }
    if let Some(key) = entry.key.as_deref().filter(|k| !k.is_empty())
        && let Some(token) = remote.iter().find(|token| token.key == key)
    {
        return Some(token);
    }
    let name = entry.name.as_deref()?;
    remote.iter().find(|token| token.name == name)
}

/// Resolve pending sale uploads against the refreshed token list.
///
/// A name can match several tokens when an older token shares it; the newest (highest id)
/// token not claimed by a declared id wins. Matches without key material are skipped.
pub fn sale_records(
    pending: &[PendingSaleUpload],
    remote: &[RemoteToken],
    desired: &[DesiredToken],
    username: &str,
    account_id: &str,
    key_type: &str,
) -> Vec<LedgerKeyRecord> {
    let claimed: HashSet<TokenId> = desired.iter().filter_map(|entry| entry.id).collect();
    let mut used: HashSet<TokenId> = HashSet::new();

    let mut records = Vec::new();
    for upload in pending {
        let candidate = remote
            .iter()
            .filter(|token| token.name == upload.name && !claimed.contains(&token.id) && !used.contains(&token.id))
            .max_by_key(|token| token.id);

        let Some(token) = candidate else {
            tracing::warn!(name = %upload.name, "Created sale token not found after refresh");
            continue;
        };
        used.insert(token.id);

        if !token.has_key() {
            tracing::warn!(name = %upload.name, token_id = token.id, "Created sale token has no key, skipping upload");
            continue;
        }

        records.push(LedgerKeyRecord {
            key: token.key.clone(),
            key_type: key_type.to_string(),
            is_sold: false,
            quota: to_normalized(upload.quota),
            source: format!("{}-{}", username, token.name),
            account_id: account_id.to_string(),
        });
    }
    records
}

/// Ledger update after a confirmed supplement: additive delta plus absolute balances.
pub fn supplement_update(token: &RemoteToken, delta: i64, now: DateTime<Utc>) -> Option<KeyInfoUpdate> {
    if !token.has_key() {
        return None;
    }
    KeyInfoUpdate::new(
        token.key.clone(),
        Some(KeyIncrement {
            quota: to_normalized(delta),
        }),
        Some(overwrite(token, now)),
    )
}

/// Ledger update for a sale token whose usage moved since the last run, or that is sold.
///
/// Entries without an id were created this run and are covered by the upload instead.
pub fn drift_update(entry: &DesiredToken, remote: &[RemoteToken], now: DateTime<Utc>) -> Option<KeyInfoUpdate> {
    if entry.is_deleted || entry.id.is_none() || !entry.is_sale() {
        return None;
    }
    let token = match_remote(entry, remote)?;
    if !token.has_key() {
        return None;
    }

    let drifted = entry.used_quota != Some(token.used_quota);
    if !drifted && !entry.is_sold {
        return None;
    }

    KeyInfoUpdate::new(token.key.clone(), None, Some(overwrite(token, now)))
}

fn overwrite(token: &RemoteToken, now: DateTime<Utc>) -> KeyOverwrite {
    KeyOverwrite {
        remain_quota: to_normalized(token.remain_quota),
        used_quota: to_normalized(token.used_quota),
        last_sync_time: now,
    }
}

/// Normalized token list reported at the end of a run.
///
/// The sold flag is carried over from the declared entry that refers to the token.
pub fn final_view(remote: &[RemoteToken], desired: &[DesiredToken]) -> Vec<DesiredToken> {
    remote
        .iter()
        .map(|token| {
            let is_sold = desired
                .iter()
                .filter(|entry| !entry.is_deleted)
                .find(|entry| {
                    entry.id == Some(token.id)
                        || (entry.id.is_none() && entry.key.as_deref().is_some_and(|k| !k.is_empty() && k == token.key))
                })
                .is_some_and(|entry| entry.is_sold);
            DesiredToken::from_remote(token, is_sold)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::token::QuotaMode;
    use rust_decimal::Decimal;
    use serde_json::Map;

    fn remote(id: TokenId, key: &str, name: &str, remain: i64, used: i64) -> RemoteToken {
        RemoteToken {
            id,
            key: key.to_string(),
            name: name.to_string(),
            unlimited_quota: false,
            remain_quota: remain,
            used_quota: used,
            extra: Map::new(),
        }
    }

    fn sale(id: TokenId, used: Option<i64>, is_sold: bool) -> DesiredToken {
        DesiredToken {
            id: Some(id),
            name: Some(format!("sold_{}", id)),
            is_sold,
            used_quota: used,
            ..Default::default()
        }
    }

    #[test]
    fn test_deletions_dedup_and_require_id() {
        let desired = vec![
            DesiredToken {
                id: Some(1),
                is_deleted: true,
                ..Default::default()
            },
            DesiredToken {
                id: Some(1),
                is_deleted: true,
                ..Default::default()
            },
            DesiredToken {
                id: Some(2),
                ..Default::default()
            },
            DesiredToken {
                is_deleted: true,
                ..Default::default()
            },
        ];
        assert_eq!(deletions(&desired), vec![1]);
    }

    #[test]
    fn test_creations_use_mode_and_defaults() {
        let desired = vec![
            DesiredToken {
                name: Some("sold_a".to_string()),
                remain_quota: Some(1_000_000),
                ..Default::default()
            },
            DesiredToken {
                unlimited_quota: true,
                ..Default::default()
            },
            DesiredToken {
                id: Some(4),
                ..Default::default()
            },
        ];

        let planned = creations(&desired);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0], (0, TokenSpec::bounded("sold_a", 1_000_000)));
        assert_eq!(planned[1].1.mode, QuotaMode::Unlimited);
        assert_eq!(planned[1].1.name, "dw");
    }

    #[test]
    fn test_match_remote_prefers_id() {
        let tokens = vec![remote(1, "a", "x", 0, 0), remote(2, "b", "y", 0, 0)];

        let by_id = DesiredToken {
            id: Some(2),
            name: Some("x".to_string()),
            ..Default::default()
        };
        assert_eq!(match_remote(&by_id, &tokens).unwrap().id, 2);

        let missing = DesiredToken {
            id: Some(9),
            name: Some("x".to_string()),
            ..Default::default()
        };
        assert!(match_remote(&missing, &tokens).is_none());

        let by_key = DesiredToken {
            key: Some("b".to_string()),
            name: Some("x".to_string()),
            ..Default::default()
        };
        assert_eq!(match_remote(&by_key, &tokens).unwrap().id, 2);

        let by_name = DesiredToken {
            name: Some("x".to_string()),
            ..Default::default()
        };
        assert_eq!(match_remote(&by_name, &tokens).unwrap().id, 1);
    }

    #[test]
    fn test_sale_records_pick_newest_unclaimed() {
        let tokens = vec![
            remote(3, "old", "sold_a", 0, 0),
            remote(8, "new", "sold_a", 0, 0),
            remote(9, "", "sold_b", 0, 0),
        ];
        let desired = vec![DesiredToken {
            id: Some(3),
            ..Default::default()
        }];
        let pending = vec![
            PendingSaleUpload {
                name: "sold_a".to_string(),
                quota: 1_000_000,
            },
            PendingSaleUpload {
                name: "sold_b".to_string(),
                quota: 500_000,
            },
            PendingSaleUpload {
                name: "sold_c".to_string(),
                quota: 500_000,
            },
        ];

        let records = sale_records(&pending, &tokens, &desired, "alice", "42", "newapi");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "new");
        assert_eq!(records[0].quota, Decimal::new(2, 0));
        assert_eq!(records[0].source, "alice-sold_a");
        assert!(!records[0].is_sold);
    }

    #[test]
    fn test_sale_records_two_pending_with_same_name() {
        let tokens = vec![remote(5, "k5", "sold_a", 0, 0), remote(6, "k6", "sold_a", 0, 0)];
        let pending = vec![
            PendingSaleUpload {
                name: "sold_a".to_string(),
                quota: 1,
            },
            PendingSaleUpload {
                name: "sold_a".to_string(),
                quota: 1,
            },
        ];

        let records = sale_records(&pending, &tokens, &[], "u", "1", "t");
        let keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["k6", "k5"]);
    }

    #[test]
    fn test_supplement_update_values() {
        let token = remote(7, "k", "dw", 150_000, 0);
        let update = supplement_update(&token, 50_000, Utc::now()).unwrap();
        assert_eq!(update.inc_data.unwrap().quota, Decimal::new(1, 1));
        let overwrite = update.update_data.unwrap();
        assert_eq!(overwrite.remain_quota, Decimal::new(3, 1));
        assert_eq!(overwrite.used_quota, Decimal::ZERO);

        let keyless = remote(7, "", "dw", 150_000, 0);
        assert!(supplement_update(&keyless, 50_000, Utc::now()).is_none());
    }

    #[test]
    fn test_drift_only_on_change_or_sold() {
        let tokens = vec![remote(1, "k1", "sold_1", 10, 100), remote(2, "k2", "sold_2", 10, 200)];
        let now = Utc::now();

        // unchanged, not sold
        assert!(drift_update(&sale(1, Some(100), false), &tokens, now).is_none());
        // changed
        let update = drift_update(&sale(1, Some(50), false), &tokens, now).unwrap();
        assert!(update.inc_data.is_none());
        assert_eq!(update.update_data.unwrap().used_quota, to_normalized(100));
        // unchanged but sold
        assert!(drift_update(&sale(2, Some(200), true), &tokens, now).is_some());
        // never observed
        assert!(drift_update(&sale(2, None, false), &tokens, now).is_some());
    }

    #[test]
    fn test_drift_skips_non_sale_and_keyless() {
        let tokens = vec![remote(1, "k1", "plain", 10, 100), remote(2, "", "sold_2", 10, 5)];
        let now = Utc::now();

        let plain = DesiredToken {
            id: Some(1),
            name: Some("plain".to_string()),
            used_quota: Some(0),
            ..Default::default()
        };
        assert!(drift_update(&plain, &tokens, now).is_none());
        assert!(drift_update(&sale(2, Some(0), true), &tokens, now).is_none());
        assert!(drift_update(&sale(3, Some(0), true), &tokens, now).is_none());
    }

    #[test]
    fn test_final_view_carries_sold_flag() {
        let tokens = vec![remote(1, "k1", "sold_1", 10, 100), remote(2, "k2", "dw", 5, 0)];
        let desired = vec![sale(1, Some(90), true)];

        let view = final_view(&tokens, &desired);
        assert_eq!(view.len(), 2);
        assert!(view[0].is_sold);
        assert_eq!(view[0].used_quota, Some(100));
        assert!(!view[1].is_sold);
        assert!(view.iter().all(|t| t.supplement_quota == 0));
    }
}
