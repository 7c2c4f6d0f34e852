//! Spent-nullifier cache with in-flight reservations.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use cloak_types::{Nullifier, TxId};
use tracing::{debug, info};

use crate::{NullifierError, Result};

#[derive(Debug, Default)]
struct Inner {
    /// Spent nullifiers and the withdrawal that spent them, if known.
    spent: HashMap<Nullifier, Option<TxId>>,
    in_flight: HashSet<Nullifier>,
    /// Reservations whose claim flow went away without settling.
    abandoned: HashSet<Nullifier>,
}

/// Spent and reserved nullifiers. Shared as `Arc<SpentNullifiers>`.
#[derive(Debug, Default)]
pub struct SpentNullifiers {
    inner: Mutex<Inner>,
}

impl SpentNullifiers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve `nullifier` for a claim attempt.
    ///
    /// # Errors
    ///
    /// - [`NullifierError::AlreadySpent`] if it is spent
    /// - [`NullifierError::InFlight`] if another claim holds it
    pub fn reserve(&self, nullifier: &Nullifier) -> Result<()> {
        let mut inner = self.lock();
        if let Some(tx) = inner.spent.get(nullifier) {
            return Err(NullifierError::AlreadySpent { tx: *tx });
        }
        if !inner.in_flight.insert(*nullifier) {
            return Err(NullifierError::InFlight);
        }
        debug!(nullifier = %nullifier.short(), "nullifier reserved");
        Ok(())
    }

    /// Drop a reservation after a failed claim.
    pub fn release(&self, nullifier: &Nullifier) {
        let mut inner = self.lock();
        inner.abandoned.remove(nullifier);
        if inner.in_flight.remove(nullifier) {
            debug!(nullifier = %nullifier.short(), "nullifier released");
        }
    }

    /// Note that the claim holding `nullifier` stopped without settling.
    /// The reservation stays until [`SpentNullifiers::release_abandoned`].
    pub fn abandon(&self, nullifier: &Nullifier) {
        let mut inner = self.lock();
        if inner.in_flight.contains(nullifier) {
            inner.abandoned.insert(*nullifier);
            debug!(nullifier = %nullifier.short(), "nullifier reservation abandoned");
        }
    }

    /// Drop the reservation on `nullifier` only if its claim was abandoned.
    /// Returns whether a reservation is still held by a live claim.
    pub fn release_abandoned(&self, nullifier: &Nullifier) -> bool {
        let mut inner = self.lock();
        if inner.abandoned.remove(nullifier) {
            inner.in_flight.remove(nullifier);
            debug!(nullifier = %nullifier.short(), "abandoned reservation released");
            return false;
        }
        inner.in_flight.contains(nullifier)
    }

    /// Record `nullifier` as spent by `tx`, clearing any reservation.
    ///
    /// Repeating the call with the same transaction (or with `None`) is a
    /// no-op. A known spend is never overwritten by a different transaction.
    pub fn mark_spent(&self, nullifier: &Nullifier, tx: Option<TxId>) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.in_flight.remove(nullifier);
        inner.abandoned.remove(nullifier);
        match inner.spent.get_mut(nullifier) {
            Some(existing) => match (*existing, tx) {
                (Some(a), Some(b)) if a != b => {
                    return Err(NullifierError::ConflictingSpend {
                        nullifier: *nullifier,
                    })
                }
                (None, Some(b)) => *existing = Some(b),
                _ => {}
            },
            None => {
                inner.spent.insert(*nullifier, tx);
                info!(nullifier = %nullifier.short(), "nullifier marked spent");
            }
        }
        Ok(())
    }

    pub fn is_spent(&self, nullifier: &Nullifier) -> bool {
        self.lock().spent.contains_key(nullifier)
    }

    pub fn is_in_flight(&self, nullifier: &Nullifier) -> bool {
        self.lock().in_flight.contains(nullifier)
    }

    /// Transaction that spent `nullifier`, when recorded.
    pub fn spending_tx(&self, nullifier: &Nullifier) -> Option<TxId> {
        self.lock().spent.get(nullifier).copied().flatten()
    }

    pub fn spent_count(&self) -> usize {
        self.lock().spent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn n(b: u8) -> Nullifier {
        Nullifier::from_bytes([b; 32])
    }

    #[test]
    fn test_reserve_then_mark_spent() {
        let cache = SpentNullifiers::new();
        cache.reserve(&n(1)).expect("reserve");
        assert!(cache.is_in_flight(&n(1)));
        assert_eq!(cache.reserve(&n(1)), Err(NullifierError::InFlight));

        let tx = TxId::from_bytes([7; 32]);
        cache.mark_spent(&n(1), Some(tx)).expect("mark");
        assert!(cache.is_spent(&n(1)));
        assert!(!cache.is_in_flight(&n(1)));
        assert_eq!(
            cache.reserve(&n(1)),
            Err(NullifierError::AlreadySpent { tx: Some(tx) })
        );
    }

    #[test]
    fn test_release_allows_retry() {
        let cache = SpentNullifiers::new();
        cache.reserve(&n(2)).expect("reserve");
        cache.release(&n(2));
        cache.reserve(&n(2)).expect("reserve again");
        assert_eq!(cache.spent_count(), 0);
    }

    #[test]
    fn test_live_reservation_survives_release_abandoned() {
        let cache = SpentNullifiers::new();
        cache.reserve(&n(5)).expect("reserve");
        assert!(cache.release_abandoned(&n(5)));
        assert!(cache.is_in_flight(&n(5)));

        cache.abandon(&n(5));
        assert!(!cache.release_abandoned(&n(5)));
        assert!(!cache.is_in_flight(&n(5)));
        cache.reserve(&n(5)).expect("reserve after release");
        assert!(cache.release_abandoned(&n(5)));
    }

    #[test]
    fn test_abandon_without_reservation_is_noop() {
        let cache = SpentNullifiers::new();
        cache.abandon(&n(6));
        assert!(!cache.release_abandoned(&n(6)));
        cache.reserve(&n(6)).expect("reserve");
        assert!(cache.release_abandoned(&n(6)));
    }

    #[test]
    fn test_mark_spent_idempotent() {
        let cache = SpentNullifiers::new();
        let tx = TxId::from_bytes([3; 32]);
        cache.mark_spent(&n(3), None).expect("unknown tx");
        cache.mark_spent(&n(3), Some(tx)).expect("fill in tx");
        cache.mark_spent(&n(3), Some(tx)).expect("repeat");
        cache.mark_spent(&n(3), None).expect("repeat without tx");
        assert_eq!(cache.spending_tx(&n(3)), Some(tx));
        assert_eq!(cache.spent_count(), 1);

        assert_eq!(
            cache.mark_spent(&n(3), Some(TxId::from_bytes([4; 32]))),
            Err(NullifierError::ConflictingSpend { nullifier: n(3) })
        );
    }

    #[test]
    fn test_single_winner_under_contention() {
        let cache = Arc::new(SpentNullifiers::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.reserve(&n(9)).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }
}
