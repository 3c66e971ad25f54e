//! Per-entity id sequences. Thread and reply ids come from independent
//! counters; each draw is one atomic increment, so ids are unique and
//! strictly increasing per sequence and never reused after a delete.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Thread,
    Reply,
}

impl Sequence {
    /// Counter row name, shared by every backend.
    pub const fn name(self) -> &'static str {
        match self {
            Sequence::Thread => "thread_id_counter",
            Sequence::Reply => "reply_id_counter",
        }
    }
}

/// Counter values for the in-memory backend; serialized with its snapshot.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Counters {
    values: BTreeMap<String, Id>,
}

impl Counters {
    pub fn next(&mut self, seq: Sequence) -> Id {
        let v = self.values.entry(seq.name().to_owned()).or_insert(0);
        *v += 1;
        *v
    }
}

/// Single-row atomic increment; runs inside the caller's transaction when
/// given one.
#[cfg(feature = "postgres-store")]
pub async fn next_value<'e, E>(executor: E, seq: Sequence) -> Result<Id, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_scalar::<_, Id>(
        "INSERT INTO counters (name, seq) VALUES ($1, 1) \
         ON CONFLICT (name) DO UPDATE SET seq = counters.seq + 1 \
         RETURNING seq",
    )
    .bind(seq.name())
    .fetch_one(executor)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_independent() {
        let mut c = Counters::default();
        assert_eq!(c.next(Sequence::Thread), 1);
        assert_eq!(c.next(Sequence::Thread), 2);
        assert_eq!(c.next(Sequence::Reply), 1);
        assert_eq!(c.next(Sequence::Thread), 3);
    }
}
