//! The shared ledger: one writer at a time, any number of snapshot readers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::tokio::sync::{broadcast, Mutex, RwLock};

use crate::error::{ChainError, Result};
use crate::model::{
    event::{verify_chain, ChainHead, RecordedEvent},
    guard::{Authority, Caller, Clock, Context},
    state::{Command, LedgerState},
    store::EventStore,
};

/// How many committed records a slow subscriber may fall behind before it
/// starts missing them.
const SUBSCRIBER_BACKLOG: usize = 256;

/// The latest commit: the chain head and the state it leads to.
#[derive(Clone)]
struct Published {
    head: ChainHead,
    state: Arc<LedgerState>,
}

/// A cheaply cloneable handle on the ledger.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<Inner>,
}

struct Inner {
    /// Held for the whole of a transaction.
    writer: Mutex<()>,
    /// Only replaced by the holder of `writer`.
    published: RwLock<Published>,
    store: Box<dyn EventStore>,
    clock: Box<dyn Clock>,
    authority: Authority,
    committed: broadcast::Sender<RecordedEvent>,
}

impl Ledger {
    /// Rebuild the ledger from everything in `store`, verifying the chain.
    pub async fn open(
        store: Box<dyn EventStore>,
        clock: Box<dyn Clock>,
        authority: Authority,
    ) -> Result<Self> {
        let records = store.load().await?;
        let head = verify_chain(&records)?;
        let state = LedgerState::replay(&records)?;
        info!(
            "Opened ledger with {} events, head {}",
            head.length, head.digest
        );

        let (committed, _) = broadcast::channel(SUBSCRIBER_BACKLOG);
        Ok(Self {
            inner: Arc::new(Inner {
                writer: Mutex::new(()),
                published: RwLock::new(Published {
                    head,
                    state: Arc::new(state),
                }),
                store,
                clock,
                authority,
                committed,
            }),
        })
    }

    /// Run `command` as a single transaction. On success the event is durable,
    /// visible to readers and published to subscribers. On failure nothing has
    /// changed.
    pub async fn submit(&self, caller: &Caller, command: Command) -> Result<RecordedEvent> {
        let _writer = self.inner.writer.lock().await;
        let ctx = self.context(caller);
        let Published {
            head,
            state: current,
        } = self.published().await;

        let event = current.plan(&ctx, &command).map_err(|err| {
            debug!("Refused {command:?} from {}: {err}", caller.identity);
            err
        })?;
        let record = RecordedEvent::seal(&head, ctx.now, event);

        let mut next = LedgerState::clone(&current);
        next.apply(&record.event)
            .map_err(|source| ChainError::Inconsistent {
                sequence: record.sequence,
                kind: record.event.kind(),
                source,
            })?;

        if let Err(err) = self.inner.store.append(&record).await {
            error!("Failed to persist event {}: {err}", record.sequence);
            return Err(err);
        }

        *self.inner.published.write().await = Published {
            head: ChainHead {
                length: record.sequence,
                digest: record.digest,
            },
            state: Arc::new(next),
        };
        // Having no subscribers is not an error.
        let _ = self.inner.committed.send(record.clone());
        info!(
            "Recorded event {} ({}) from {}",
            record.sequence,
            record.event.kind(),
            caller.identity
        );
        Ok(record)
    }

    async fn published(&self) -> Published {
        self.inner.published.read().await.clone()
    }

    /// The latest committed state. Never waits for a transaction to finish.
    pub async fn snapshot(&self) -> Arc<LedgerState> {
        self.published().await.state
    }

    /// The guard context for a call made by `caller` right now.
    pub fn context(&self, caller: &Caller) -> Context {
        Context::new(caller.clone(), self.inner.authority.clone(), self.now())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn authority(&self) -> &Authority {
        &self.inner.authority
    }

    pub async fn head(&self) -> ChainHead {
        self.published().await.head
    }

    /// Every committed record, in sequence order, together with the head they
    /// lead to. Never waits for a transaction to finish.
    pub async fn export(&self) -> Result<(ChainHead, Vec<RecordedEvent>)> {
        let head = self.head().await;
        let mut records = self.inner.store.load().await?;
        // Records are stored before they are published, so the store may
        // already hold commits that came after `head`.
        records.truncate(head.length as usize);
        Ok((head, records))
    }

    /// Receive every record committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordedEvent> {
        self.inner.committed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::error::{Error, LedgerError};
    use crate::model::{
        event::{Digest, Event},
        guard::ManualClock,
        store::{EventStore, MemoryEventStore},
        voter::VoterDetails,
    };

    async fn ledger(store: &MemoryEventStore, clock: &ManualClock) -> Ledger {
        Ledger::open(
            Box::new(store.clone()),
            Box::new(clock.clone()),
            Authority::new("admin"),
        )
        .await
        .unwrap()
    }

    fn admin() -> Caller {
        Caller::new("admin")
    }

    #[rocket::async_test]
    async fn commits_are_chained_and_stored() {
        let store = MemoryEventStore::new();
        let clock = ManualClock::default();
        let ledger = ledger(&store, &clock).await;
        assert_eq!(ledger.head().await, ChainHead::GENESIS);

        let first = ledger
            .submit(&Caller::new("alice"), Command::RegisterVoter(VoterDetails::example()))
            .await
            .unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.previous, Digest::ZERO);
        assert_eq!(first.recorded_at, clock.now());

        clock.advance(Duration::minutes(1));
        let second = ledger
            .submit(&admin(), Command::ApproveVoter("alice".into()))
            .await
            .unwrap();
        assert_eq!(second.previous, first.digest);

        let (head, records) = ledger.export().await.unwrap();
        assert_eq!(records, vec![first, second.clone()]);
        assert_eq!(head.digest, second.digest);
        assert_eq!(verify_chain(&records).unwrap(), head);
    }

    #[rocket::async_test]
    async fn refused_commands_leave_no_trace() {
        let store = MemoryEventStore::new();
        let ledger = ledger(&store, &ManualClock::default()).await;

        let err = ledger
            .submit(&admin(), Command::OpenElection(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Ledger(LedgerError::UnknownElection(1))
        ));
        assert_eq!(ledger.head().await, ChainHead::GENESIS);
        assert!(store.load().await.unwrap().is_empty());
        assert_eq!(*ledger.snapshot().await, LedgerState::new());
    }

    #[rocket::async_test]
    async fn reopening_replays_the_log() {
        let store = MemoryEventStore::new();
        let clock = ManualClock::default();
        let start_time = clock.now() + Duration::hours(1);
        {
            let ledger = ledger(&store, &clock).await;
            ledger
                .submit(
                    &admin(),
                    Command::CreateElection {
                        name: "General".to_string(),
                        start_time,
                        end_time: start_time + Duration::hours(1),
                    },
                )
                .await
                .unwrap();
            ledger
                .submit(
                    &admin(),
                    Command::CreatePosition {
                        election_id: 1,
                        position: "Chair".to_string(),
                    },
                )
                .await
                .unwrap();
        }

        let reopened = ledger(&store, &clock).await;
        assert_eq!(reopened.head().await.length, 2);
        let state = reopened.snapshot().await;
        assert_eq!(state.election(1).unwrap().positions.len(), 1);
    }

    #[rocket::async_test]
    async fn tampered_logs_refuse_to_open() {
        let clock = ManualClock::default();
        let store = MemoryEventStore::new();
        ledger(&store, &clock)
            .await
            .submit(&admin(), Command::ResetRegistrations)
            .await
            .unwrap();

        let mut records = store.load().await.unwrap();
        records[0].event = Event::VoterApproved {
            identity: "mallory".into(),
        };
        let tampered = MemoryEventStore::with_records(records);
        let result = Ledger::open(
            Box::new(tampered),
            Box::new(clock),
            Authority::new("admin"),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::Chain(ChainError::Tampered { sequence: 1, .. }))
        ));
    }

    #[rocket::async_test]
    async fn subscribers_see_commits_in_order() {
        let ledger = ledger(&MemoryEventStore::new(), &ManualClock::default()).await;
        let mut events = ledger.subscribe();

        for name in ["alice", "bob"] {
            ledger
                .submit(&Caller::new(name), Command::RegisterVoter(VoterDetails::example()))
                .await
                .unwrap();
        }
        assert_eq!(events.recv().await.unwrap().sequence, 1);
        assert_eq!(events.recv().await.unwrap().sequence, 2);
    }

    /// A store whose reads take a long time.
    struct SlowStore(MemoryEventStore);

    #[rocket::async_trait]
    impl EventStore for SlowStore {
        async fn load(&self) -> Result<Vec<RecordedEvent>> {
            rocket::tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            self.0.load().await
        }

        async fn append(&self, record: &RecordedEvent) -> Result<()> {
            self.0.append(record).await
        }
    }

    #[rocket::async_test]
    async fn exports_do_not_hold_up_commits() {
        let store = MemoryEventStore::new();
        let ledger = Ledger::open(
            Box::new(SlowStore(store.clone())),
            Box::new(ManualClock::default()),
            Authority::new("admin"),
        )
        .await
        .unwrap();

        let (export, committed) = rocket::tokio::join!(ledger.export(), async {
            rocket::tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            rocket::tokio::time::timeout(
                std::time::Duration::from_millis(200),
                ledger.submit(
                    &Caller::new("alice"),
                    Command::RegisterVoter(VoterDetails::example()),
                ),
            )
            .await
        });

        // The commit went through while the export was still reading.
        assert_eq!(committed.unwrap().unwrap().sequence, 1);
        // The export stops at the head it started from, although the store
        // already holds the later commit.
        let (head, records) = export.unwrap();
        assert_eq!(head, ChainHead::GENESIS);
        assert!(records.is_empty());
        assert_eq!(store.load().await.unwrap().len(), 1);
        assert_eq!(ledger.export().await.unwrap().1.len(), 1);
    }

    #[test]
    fn concurrent_votes_are_all_counted() {
        let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let clock = ManualClock::default();
            let ledger = ledger(&MemoryEventStore::new(), &clock).await;
            let voters = (0..40).map(|i| format!("voter{i}")).collect::<Vec<_>>();
            for voter in &voters {
                ledger
                    .submit(
                        &Caller::new(voter.as_str()),
                        Command::RegisterVoter(VoterDetails::example()),
                    )
                    .await
                    .unwrap();
                ledger
                    .submit(&admin(), Command::ApproveVoter(voter.as_str().into()))
                    .await
                    .unwrap();
            }
            let start_time = clock.now() + Duration::minutes(1);
            for command in [
                Command::CreateElection {
                    name: "General".to_string(),
                    start_time,
                    end_time: start_time + Duration::hours(1),
                },
                Command::CreatePosition {
                    election_id: 1,
                    position: "Chair".to_string(),
                },
                Command::RegisterCandidate {
                    election_id: 1,
                    position: "Chair".to_string(),
                    name: "A".to_string(),
                },
                Command::ApproveCandidate {
                    election_id: 1,
                    position: "Chair".to_string(),
                    candidate_id: 1,
                },
                Command::OpenElection(1),
            ] {
                ledger.submit(&admin(), command).await.unwrap();
            }
            clock.set(start_time);

            // Every voter votes twice at once; exactly one of each pair lands.
            let tasks = voters
                .iter()
                .chain(voters.iter())
                .map(|voter| {
                    let ledger = ledger.clone();
                    let caller = Caller::new(voter.as_str());
                    rocket::tokio::spawn(async move {
                        ledger
                            .submit(
                                &caller,
                                Command::Vote {
                                    election_id: 1,
                                    position: "Chair".to_string(),
                                    candidate_id: 1,
                                },
                            )
                            .await
                            .is_ok()
                    })
                })
                .collect::<Vec<_>>();
            let mut accepted = 0;
            for task in tasks {
                if task.await.unwrap() {
                    accepted += 1;
                }
            }

            assert_eq!(accepted, voters.len());
            let state = ledger.snapshot().await;
            assert_eq!(
                state.candidate(1, "Chair", 1).unwrap().votes,
                voters.len() as u64
            );
            assert_eq!(state.ballots_cast(1, "Chair"), voters.len());
        });
    }
}
