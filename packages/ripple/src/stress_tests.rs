//! Stress tests designed to break the ripple engine.
//!
//! These tests exercise ordering under contention, feedback storms and
//! stopping while work is in flight.

#[cfg(test)]
mod stress_tests {
    use crate::core::Transition;
    use crate::engine::{Engine, EngineBuilder};
    use crate::executor::{self, EventStream, Executor};
    use crate::reducer::{Reducer, TransitionOf};
    use crate::testing::RecordingListener;
    use futures::StreamExt;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    // ==========================================================================
    // Test Types
    // ==========================================================================

    #[derive(Debug, Clone, PartialEq)]
    enum LoadEvent {
        Produced { producer: usize, seq: usize },
        Increment,
        Notify(usize),
        Spawn(u32),
        Add { amount: i64, explode: bool },
        Work(u64),
        Done,
        Forever,
        Tick,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct LoadState {
        count: i64,
        next_seq: Vec<usize>,
        out_of_order: usize,
        dispatched: usize,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum LoadEffect {
        Notified(usize),
    }

    #[derive(Debug, Clone, PartialEq)]
    enum LoadCommand {
        Fan(u32),
        Work(u64),
        Forever,
    }

    struct LoadReducer;

    impl Reducer for LoadReducer {
        type Event = LoadEvent;
        type State = LoadState;
        type Effect = LoadEffect;
        type Command = LoadCommand;

        fn reduce(&self, event: &LoadEvent, state: &LoadState) -> TransitionOf<Self> {
            let mut next = state.clone();
            next.dispatched += 1;
            match event {
                LoadEvent::Produced { producer, seq } => {
                    if next.next_seq.len() <= *producer {
                        next.next_seq.resize(producer + 1, 0);
                    }
                    if next.next_seq[*producer] != *seq {
                        next.out_of_order += 1;
                    }
                    next.next_seq[*producer] = seq + 1;
                    next.count += 1;
                    Transition::to(next)
                }
                LoadEvent::Increment | LoadEvent::Done | LoadEvent::Tick => {
                    next.count += 1;
                    Transition::to(next)
                }
                LoadEvent::Notify(n) => Transition::to(next).with_effect(LoadEffect::Notified(*n)),
                LoadEvent::Spawn(0) => {
                    next.count += 1;
                    Transition::to(next)
                }
                LoadEvent::Spawn(depth) => Transition::to(next).with_command(LoadCommand::Fan(*depth)),
                LoadEvent::Add { amount, explode } => {
                    if *explode {
                        panic!("injected fault on {}", amount);
                    }
                    next.count += amount;
                    Transition::to(next)
                }
                LoadEvent::Work(delay_ms) => {
                    Transition::to(next).with_command(LoadCommand::Work(*delay_ms))
                }
                LoadEvent::Forever => Transition::to(next).with_command(LoadCommand::Forever),
            }
        }
    }

    struct LoadExecutor;

    impl Executor<LoadCommand, LoadEvent> for LoadExecutor {
        fn execute(&self, command: LoadCommand) -> EventStream<LoadEvent> {
            match command {
                LoadCommand::Fan(depth) => {
                    executor::iter([LoadEvent::Spawn(depth - 1), LoadEvent::Spawn(depth - 1)])
                }
                LoadCommand::Work(delay_ms) => executor::once(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(LoadEvent::Done)
                }),
                LoadCommand::Forever => futures::stream::unfold((), |_| async {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Some((Ok(LoadEvent::Tick), ()))
                })
                .boxed(),
            }
        }
    }

    fn load_engine() -> Engine<LoadReducer> {
        EngineBuilder::new(LoadState::default(), LoadReducer)
            .with_executor(LoadExecutor)
            .build()
    }

    async fn settle(engine: &Engine<LoadReducer>) {
        tokio::time::timeout(TIMEOUT, engine.settled())
            .await
            .expect("engine did not settle in time");
    }

    // ==========================================================================
    // TEST: Concurrent producers keep their own submission order
    // ==========================================================================
    //
    // The mailbox is FIFO, so two submissions from the same task must be
    // reduced in the order they were made, whatever other producers do.

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_preserve_per_producer_order() {
        let engine = load_engine();
        let producers = 8;
        let per_producer = 500;
        let mut handles = vec![];

        for producer in 0..producers {
            let mailbox = engine.mailbox();
            handles.push(tokio::spawn(async move {
                for seq in 0..per_producer {
                    mailbox.submit(LoadEvent::Produced { producer, seq });
                    if seq % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        for h in handles {
            h.await.unwrap();
        }
        settle(&engine).await;

        let state = engine.state();
        assert_eq!(state.count, (producers * per_producer) as i64);
        assert_eq!(
            state.out_of_order, 0,
            "{} events were reduced out of submission order",
            state.out_of_order
        );
        assert!(state.next_seq.iter().all(|n| *n == per_producer));
    }

    // ==========================================================================
    // TEST: Recursive feedback storm
    // ==========================================================================
    //
    // Every Spawn(d > 0) schedules a command that feeds back two Spawn(d - 1).
    // Nothing may be lost and settled() must wait for the whole tree.

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_recursive_feedback_storm() {
        let engine = load_engine();
        let depth = 10;

        engine.submit(LoadEvent::Spawn(depth));
        settle(&engine).await;

        let state = engine.state();
        assert_eq!(state.count, 1 << depth, "every leaf should be counted once");
        assert_eq!(state.dispatched, (1 << (depth + 1)) - 1);
        assert_eq!(engine.pending(), 0);
    }

    // ==========================================================================
    // TEST: Settled waits for commands with random latency
    // ==========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_settled_waits_for_slow_commands() {
        let engine = load_engine();
        let mut rng = fastrand::Rng::with_seed(42);
        let jobs = 200;

        for _ in 0..jobs {
            engine.submit(LoadEvent::Work(rng.u64(0..10)));
        }
        settle(&engine).await;

        // One Done per Work.
        assert_eq!(engine.state().count, jobs);
        assert_eq!(engine.state().dispatched, (jobs * 2) as usize);
    }

    // ==========================================================================
    // TEST: Late state subscribers see contiguous commits
    // ==========================================================================
    //
    // A subscriber may join at any point, but from its first value on it must
    // observe every commit: no gaps, no duplicates, no reordering.

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_late_subscribers_see_contiguous_values() {
        let engine = load_engine();
        let total = 2000;
        let mut rng = fastrand::Rng::with_seed(7);
        let mut watchers = vec![];

        let producer = {
            let mailbox = engine.mailbox();
            tokio::spawn(async move {
                for i in 0..total {
                    mailbox.submit(LoadEvent::Increment);
                    if i % 100 == 0 {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
            })
        };

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(rng.u64(0..5))).await;
            let mut states = engine.subscribe_state();
            watchers.push(tokio::spawn(async move {
                let mut seen = vec![];
                while let Some(state) = states.recv().await {
                    seen.push(state.count);
                    if state.count == total {
                        break;
                    }
                }
                seen
            }));
        }

        producer.await.unwrap();
        settle(&engine).await;

        for watcher in watchers {
            let seen = tokio::time::timeout(TIMEOUT, watcher)
                .await
                .expect("watcher stalled")
                .unwrap();
            assert_eq!(seen.last(), Some(&total));
            for pair in seen.windows(2) {
                assert_eq!(pair[1], pair[0] + 1, "gap or reorder in {:?}", pair);
            }
        }
    }

    // ==========================================================================
    // TEST: Effect fan-out keeps emission order per subscriber
    // ==========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_effect_fanout_order() {
        let engine = load_engine();
        let total = 500;
        let subscribers: Vec<_> = (0..4).map(|_| engine.subscribe_effects()).collect();

        for n in 0..total {
            engine.submit(LoadEvent::Notify(n));
        }
        settle(&engine).await;
        engine.shutdown().await;

        for subscription in subscribers {
            let received: Vec<usize> = subscription
                .into_stream()
                .map(|LoadEffect::Notified(n)| n)
                .collect()
                .await;
            assert_eq!(received, (0..total).collect::<Vec<_>>());
        }
    }

    // ==========================================================================
    // TEST: Random reducer faults never stop the engine
    // ==========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_random_reducer_faults_are_isolated() {
        let recorder = RecordingListener::new();
        let engine = EngineBuilder::new(LoadState::default(), LoadReducer)
            .with_executor(LoadExecutor)
            .with_listener(recorder.clone())
            .build();

        let mut rng = fastrand::Rng::with_seed(1234);
        let mut expected = 0;
        let mut faults = 0;

        for amount in 0..300 {
            let explode = rng.u8(0..10) == 0;
            if explode {
                faults += 1;
            } else {
                expected += amount;
            }
            engine.submit(LoadEvent::Add { amount, explode });
        }
        settle(&engine).await;

        assert_eq!(engine.state().count, expected);
        assert_eq!(engine.state().dispatched, 300 - faults);
        assert_eq!(recorder.reducer_errors().len(), faults);
        assert!(recorder
            .reducer_errors()
            .iter()
            .all(|(event, _)| matches!(event, LoadEvent::Add { explode: true, .. })));
    }

    // ==========================================================================
    // TEST: Stop under load
    // ==========================================================================
    //
    // Many unbounded commands plus a busy producer. After shutdown the state
    // must freeze, subscriptions must end and nothing may be left pending.

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_under_load() {
        let recorder = RecordingListener::new();
        let engine = EngineBuilder::new(LoadState::default(), LoadReducer)
            .with_executor(LoadExecutor)
            .with_listener(recorder.clone())
            .build();
        let mut states = engine.subscribe_state();
        let mut effects = engine.subscribe_effects();

        for _ in 0..50 {
            engine.submit(LoadEvent::Forever);
        }
        let producer = {
            let mailbox = engine.mailbox();
            tokio::spawn(async move {
                let mut n = 0;
                while !mailbox.is_closed() {
                    mailbox.submit(LoadEvent::Notify(n));
                    n += 1;
                    tokio::task::yield_now().await;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::time::timeout(TIMEOUT, engine.shutdown())
            .await
            .expect("shutdown stalled");
        tokio::time::timeout(TIMEOUT, producer)
            .await
            .expect("producer did not observe stop")
            .unwrap();

        let frozen = engine.state();
        let calls = recorder.len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.state(), frozen);
        assert_eq!(recorder.len(), calls);
        assert_eq!(engine.pending(), 0);

        // Both subscriptions drain and then end.
        let drained = tokio::time::timeout(TIMEOUT, async {
            while states.recv().await.is_some() {}
            while effects.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "subscriptions did not end after shutdown");
        assert!(recorder.actor_errors().is_empty());
    }
}
