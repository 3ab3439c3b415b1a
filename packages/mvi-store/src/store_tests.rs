//! End-to-end scenarios exercising the store with real plugins,
//! decorators and subscribers.

#[cfg(test)]
mod store_tests {
    use crate::config::{ActionShareBehavior, BufferOverflow, StoreConfiguration};
    use crate::core::StopReason;
    use crate::decorator::PluginDecorator;
    use crate::error::StoreError;
    use crate::plugin::StorePlugin;
    use crate::plugins::{
        deinit_plugin, init_plugin, logging_plugin, recover_plugin, undelivered_handling_plugin,
        while_subscribed_plugin,
    };
    use crate::store::{Store, StoreBuilder};
    use crate::testing::{EventLatch, HookRecorder};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    // ==========================================================================
    // Test Types
    // ==========================================================================

    #[derive(Debug, Clone, PartialEq)]
    enum CounterState {
        Loading(u32),
        Failed(String),
    }

    #[derive(Debug, Clone, PartialEq)]
    enum CounterIntent {
        Increment,
        Explode,
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn counter() -> StoreBuilder<CounterState, CounterIntent, ()> {
        Store::builder(CounterState::Loading(0)).reduce(|ctx, intent: CounterIntent| async move {
            match intent {
                CounterIntent::Increment => {
                    ctx.update_state(|s| match s {
                        CounterState::Loading(n) => CounterState::Loading(n + 1),
                        other => other,
                    })
                    .await
                }
                CounterIntent::Explode => Err(anyhow::anyhow!("explosion")),
            }
        })
    }

    /// Maps any exception into the `Failed` state and marks it handled.
    fn error_mapping_plugin() -> StorePlugin<CounterState, CounterIntent, ()> {
        StorePlugin::builder()
            .name("error_mapping")
            .on_exception(|ctx, e| async move {
                let message = e.to_string();
                match ctx.update_state(move |_| CounterState::Failed(message)).await {
                    Ok(()) => None,
                    Err(update_failed) => Some(update_failed),
                }
            })
            .build()
    }

    // ==========================================================================
    // Ordering
    // ==========================================================================

    #[tokio::test]
    async fn test_sequential_states_follow_send_order() {
        init_tracing();
        let published = Arc::new(Mutex::new(Vec::<Vec<u32>>::new()));
        let latch = Arc::new(EventLatch::new(50));

        let store = Store::<Vec<u32>, u32, ()>::builder(Vec::new())
            .install(
                StorePlugin::builder()
                    .name("state_log")
                    .on_state({
                        let published = published.clone();
                        let latch = latch.clone();
                        move |_, _, new: Vec<u32>| {
                            published.lock().unwrap().push(new.clone());
                            latch.dec();
                            async move { Ok(Some(new)) }
                        }
                    })
                    .build(),
            )
            .reduce(|ctx, n| async move {
                // Jitter must not reorder sequential processing
                if fastrand::bool() {
                    tokio::task::yield_now().await;
                }
                ctx.update_state(move |mut items| {
                    items.push(n);
                    items
                })
                .await
            })
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();

        for n in 0..50 {
            store.send(n).await.unwrap();
        }
        tokio::time::timeout(Duration::from_secs(5), latch.await_zero())
            .await
            .expect("not every intent was reduced");

        let published = published.lock().unwrap().clone();
        for (i, snapshot) in published.iter().enumerate() {
            assert_eq!(*snapshot, (0..=i as u32).collect::<Vec<_>>());
        }
        store.close_and_wait().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_increments_lose_no_updates() {
        init_tracing();
        let store = counter()
            .configure(StoreConfiguration::default().with_parallel_intents(true))
            .install(logging_plugin("counter"))
            .install(error_mapping_plugin())
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();
        let mut subscription = store.subscribe().unwrap();

        let mut senders = vec![];
        for _ in 0..100 {
            let store = store.clone();
            senders.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_micros(fastrand::u64(0..500))).await;
                store.send(CounterIntent::Increment).await
            }));
        }
        for sender in senders {
            sender.await.unwrap().unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while subscription.state() != CounterState::Loading(100) {
                subscription.next_state().await.expect("store stopped early");
            }
        })
        .await
        .expect("counter never reached 100");

        assert_eq!(store.state().await.unwrap(), CounterState::Loading(100));
        store.close_and_wait().await;
    }

    // ==========================================================================
    // Recovery and failure
    // ==========================================================================

    #[tokio::test]
    async fn test_handled_exception_keeps_store_running() {
        let store = counter().install(error_mapping_plugin()).build().unwrap();
        store.start(&CancellationToken::new()).unwrap();
        let mut subscription = store.subscribe().unwrap();

        store.send(CounterIntent::Explode).await.unwrap();
        let state = subscription.next_state().await.unwrap();
        assert_eq!(state, CounterState::Failed("explosion".into()));
        assert!(store.is_active());

        assert!(!store.close_and_wait().await.is_failure());
    }

    #[tokio::test]
    async fn test_stop_hooks_run_reversed_exactly_once() {
        for failing in [false, true] {
            let recorder = HookRecorder::new();
            let store = counter()
                .install(recorder.plugin("a"))
                .install(recorder.plugin("b"))
                .install(recorder.plugin("c"))
                .build()
                .unwrap();
            store.start(&CancellationToken::new()).unwrap();

            let reason = if failing {
                store.send(CounterIntent::Explode).await.unwrap();
                store.await_until_closed().await
            } else {
                store.close_and_wait().await
            };
            // Closing again is a no-op
            store.close();
            store.await_until_closed().await;

            assert_eq!(reason.is_failure(), failing);
            assert_eq!(
                recorder.entries_for("on_stop"),
                vec!["c:on_stop", "b:on_stop", "a:on_stop"]
            );
            if failing {
                // Reported once through the whole chain before terminating
                assert_eq!(
                    recorder.entries_for("on_exception"),
                    vec!["a:on_exception", "b:on_exception", "c:on_exception"]
                );
            }
        }
    }

    #[tokio::test]
    async fn test_lifecycle_errors_are_not_fatal() {
        let recorder = HookRecorder::new();
        let store = counter()
            .install(recorder.plugin("observer"))
            .install(
                StorePlugin::builder()
                    .name("broken")
                    .on_start(|_| async { Err::<(), _>(anyhow::anyhow!("start failed")) })
                    .on_subscribe(|_, _| async { Err::<(), _>(anyhow::anyhow!("subscribe failed")) })
                    .build(),
            )
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();
        let mut subscription = store.subscribe().unwrap();

        store.send(CounterIntent::Increment).await.unwrap();
        assert_eq!(subscription.next_state().await, Some(CounterState::Loading(1)));
        assert!(store.is_active());
        assert!(recorder.count("observer:on_exception") >= 1);

        assert!(!store.close_and_wait().await.is_failure());
    }

    #[tokio::test]
    async fn test_spawned_task_errors_reach_exception_hooks() {
        let recovered = Arc::new(EventLatch::new(1));
        let store = Store::<u32, u32, ()>::builder(0)
            .install(recover_plugin({
                let recovered = recovered.clone();
                move |_, e| {
                    assert_eq!(e.to_string(), "background failure");
                    recovered.dec();
                    async { None }
                }
            }))
            .reduce(|ctx, _| async move {
                ctx.spawn(|_| async { Err::<(), _>(anyhow::anyhow!("background failure")) });
                Ok(())
            })
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();

        store.send(1).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), recovered.await_zero())
            .await
            .expect("exception never reached the recover plugin");
        assert!(store.is_active());
        store.close_and_wait().await;
    }

    // ==========================================================================
    // Intent hooks
    // ==========================================================================

    #[tokio::test]
    async fn test_absorbed_intent_never_reaches_reducer() {
        let recorder = HookRecorder::new();
        let reduced = Arc::new(AtomicUsize::new(0));
        let store = Store::<u32, u32, ()>::builder(0)
            .install(
                StorePlugin::builder()
                    .name("gate")
                    .on_intent(|_, n: u32| async move { Ok((n != 13).then_some(n)) })
                    .build(),
            )
            .install(recorder.plugin("after"))
            .reduce({
                let reduced = reduced.clone();
                move |ctx, n| {
                    reduced.fetch_add(1, Ordering::SeqCst);
                    async move { ctx.update_state(move |_| n).await }
                }
            })
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();
        let mut subscription = store.subscribe().unwrap();

        store.send(13).await.unwrap();
        store.send(7).await.unwrap();
        assert_eq!(subscription.next_state().await, Some(7));

        assert_eq!(reduced.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.count("after:on_intent"), 1);
        assert_eq!(recorder.count("after:on_state"), 1);
        store.close_and_wait().await;
    }

    // ==========================================================================
    // Actions
    // ==========================================================================

    #[tokio::test]
    async fn test_distribute_delivers_to_exactly_one_subscriber() {
        let store = Store::<u32, &'static str, &'static str>::builder(0)
            .configure(StoreConfiguration::default().with_action_share_behavior(
                ActionShareBehavior::Distribute {
                    buffer_size: 1,
                    overflow: BufferOverflow::Suspend,
                },
            ))
            .reduce(|ctx, action| async move { ctx.action(action).await })
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();
        let mut first = store.subscribe().unwrap();
        let mut second = store.subscribe().unwrap();

        store.send("only-once").await.unwrap();
        let wait = Duration::from_millis(200);
        let (a, b) = tokio::join!(
            tokio::time::timeout(wait, first.next_action()),
            tokio::time::timeout(wait, second.next_action()),
        );
        let received: Vec<_> = [a.ok().flatten(), b.ok().flatten()]
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(received, vec!["only-once"]);
        store.close_and_wait().await;
    }

    #[tokio::test]
    async fn test_share_replays_last_actions_to_late_subscriber() {
        let store = Store::<u32, u32, u32>::builder(0)
            .configure(StoreConfiguration::default().with_action_share_behavior(
                ActionShareBehavior::Share {
                    buffer_size: 8,
                    replay: 2,
                    overflow: BufferOverflow::Suspend,
                },
            ))
            .build()
            .unwrap();
        let ctx = store.context();
        for a in 1..=3 {
            ctx.action(a).await.unwrap();
        }

        let mut late = store.subscribe().unwrap();
        ctx.action(4).await.unwrap();

        let mut seen = vec![];
        while let Some(a) = late.try_next_action() {
            seen.push(a);
        }
        assert_eq!(seen, vec![2, 3, 4]);
    }

    // ==========================================================================
    // Undelivered accounting
    // ==========================================================================

    #[tokio::test]
    async fn test_queued_intents_and_buffered_actions_are_reported() {
        let lost_intents = Arc::new(Mutex::new(vec![]));
        let lost_actions = Arc::new(Mutex::new(vec![]));
        let entered = Arc::new(EventLatch::new(1));

        let store = Store::<u32, u32, u32>::builder(0)
            .install(undelivered_handling_plugin(
                {
                    let lost = lost_intents.clone();
                    move |i| lost.lock().unwrap().push(i)
                },
                {
                    let lost = lost_actions.clone();
                    move |a| lost.lock().unwrap().push(a)
                },
            ))
            .reduce({
                let entered = entered.clone();
                move |ctx, n| {
                    let entered = entered.clone();
                    async move {
                        ctx.action(n * 10).await.unwrap();
                        ctx.action(n * 10 + 1).await.unwrap();
                        entered.dec();
                        // Never finishes; close cancels it
                        std::future::pending::<()>().await;
                        Ok::<(), anyhow::Error>(())
                    }
                }
            })
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();

        store.send(1).await.unwrap();
        entered.await_zero().await;
        for n in 2..=4 {
            store.send(n).await.unwrap();
        }

        store.close_and_wait().await;
        assert_eq!(*lost_intents.lock().unwrap(), vec![2, 3, 4]);
        assert_eq!(*lost_actions.lock().unwrap(), vec![10, 11]);
    }

    #[tokio::test]
    async fn test_drop_oldest_evictions_are_reported() {
        let lost = Arc::new(Mutex::new(vec![]));
        let store = Store::<u32, u32, ()>::builder(0)
            .configure(
                StoreConfiguration::default().with_intent_buffer(2, BufferOverflow::DropOldest),
            )
            .install(undelivered_handling_plugin(
                {
                    let lost = lost.clone();
                    move |i| lost.lock().unwrap().push(i)
                },
                |_| {},
            ))
            .build()
            .unwrap();

        for n in 1..=3 {
            store.try_send(n).unwrap();
        }
        assert_eq!(*lost.lock().unwrap(), vec![1]);

        // Never started: closing reports the rest without running stop hooks
        store.close();
        assert!(matches!(store.await_until_closed().await, StopReason::Closed));
        assert_eq!(*lost.lock().unwrap(), vec![1, 2, 3]);
    }

    // ==========================================================================
    // Decorators
    // ==========================================================================

    fn lazy_decorator() -> PluginDecorator<CounterState, CounterIntent, ()> {
        PluginDecorator::builder("lazy")
            .on_intent(|_, _proceed, _intent| async { Ok(None) })
            .build()
    }

    #[tokio::test]
    async fn test_store_level_decorator_violation_is_fatal_in_debug() {
        let recorder = HookRecorder::new();
        let store = counter()
            .configure(StoreConfiguration::default().with_debuggable(true))
            .install(recorder.plugin("observer"))
            .decorate(lazy_decorator())
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();

        store.send(CounterIntent::Increment).await.unwrap();
        let reason = store.await_until_closed().await;
        assert!(matches!(
            reason.error().and_then(|e| e.downcast_ref::<StoreError>()),
            Some(StoreError::ProceedContractViolated { decorator, .. }) if decorator == "lazy"
        ));
        // Contract violations are not offered to exception hooks
        assert_eq!(recorder.count("observer:on_exception"), 0);
    }

    #[tokio::test]
    async fn test_unverified_decorator_may_short_circuit() {
        let recorder = HookRecorder::new();
        let store = counter()
            .configure(StoreConfiguration::default().with_debuggable(true).with_verify_decorators(false))
            .install(recorder.plugin("observer"))
            .decorate(lazy_decorator())
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();

        store.send(CounterIntent::Increment).await.unwrap();
        store.send(CounterIntent::Increment).await.unwrap();
        let reason = store.close_and_wait().await;

        assert!(!reason.is_failure());
        assert_eq!(recorder.count("observer:on_intent"), 0);
        assert_eq!(store.delicate_state(), CounterState::Loading(0));
    }

    // ==========================================================================
    // Subscriptions
    // ==========================================================================

    #[tokio::test]
    async fn test_subscription_hooks_see_counts() {
        let counts = Arc::new(Mutex::new(vec![]));
        let latch = Arc::new(EventLatch::new(3));
        let store = Store::<u32, u32, u32>::builder(0)
            .install(
                StorePlugin::builder()
                    .name("counts")
                    .on_subscribe({
                        let counts = counts.clone();
                        let latch = latch.clone();
                        move |_, n| {
                            counts.lock().unwrap().push(format!("+{n}"));
                            latch.dec();
                            async { Ok(()) }
                        }
                    })
                    .on_unsubscribe({
                        let counts = counts.clone();
                        let latch = latch.clone();
                        move |_, n| {
                            counts.lock().unwrap().push(format!("-{n}"));
                            latch.dec();
                            async { Ok(()) }
                        }
                    })
                    .build(),
            )
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();

        let first = store.subscribe().unwrap();
        let second = store.subscribe().unwrap();
        drop(first);
        tokio::time::timeout(Duration::from_secs(1), latch.await_zero())
            .await
            .expect("subscription hooks never ran");

        assert_eq!(*counts.lock().unwrap(), vec!["+1", "+2", "-1"]);
        assert_eq!(store.subscriber_count(), 1);
        store.close_and_wait().await;
        drop(second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_while_subscribed_job_follows_subscribers() {
        let starts = Arc::new(AtomicUsize::new(0));
        let store = Store::<u32, u32, ()>::builder(0)
            .install(while_subscribed_plugin(1, Duration::from_secs(5), {
                let starts = starts.clone();
                move |ctx| {
                    starts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        ctx.update_state(|n: u32| n + 1).await.unwrap();
                        std::future::pending::<()>().await;
                        Ok::<(), anyhow::Error>(())
                    }
                }
            }))
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 0);

        let subscription = store.subscribe().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(store.delicate_state(), 1);

        // Quick resubscribe within the stop delay keeps the same job
        drop(subscription);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let subscription = store.subscribe().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        // Staying away past the delay stops it; the next subscriber restarts it
        drop(subscription);
        tokio::time::sleep(Duration::from_secs(6)).await;
        let _subscription = store.subscribe().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(store.delicate_state(), 2);

        store.close_and_wait().await;
    }

    // ==========================================================================
    // Teardown
    // ==========================================================================

    /// Sets its flag when the future holding it is dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_panicking_undelivered_hook_does_not_block_teardown() {
        for with_accounting in [false, true] {
            let stops = Arc::new(AtomicUsize::new(0));
            let lost = Arc::new(Mutex::new(vec![]));
            let entered = Arc::new(EventLatch::new(1));

            let mut builder = Store::<u32, u32, ()>::builder(0)
                .install(
                    StorePlugin::builder()
                        .name("bad")
                        .on_undelivered_intent(|i| panic!("lost track of intent {i}"))
                        .build(),
                )
                .install(deinit_plugin({
                    let stops = stops.clone();
                    move |_| {
                        stops.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            if with_accounting {
                builder = builder.install(undelivered_handling_plugin(
                    {
                        let lost = lost.clone();
                        move |i| lost.lock().unwrap().push(i)
                    },
                    |_| {},
                ));
            }
            let store = builder
                .reduce({
                    let entered = entered.clone();
                    move |_, _| {
                        let entered = entered.clone();
                        async move {
                            entered.dec();
                            std::future::pending::<()>().await;
                            Ok::<(), anyhow::Error>(())
                        }
                    }
                })
                .build()
                .unwrap();
            store.start(&CancellationToken::new()).unwrap();

            store.send(1).await.unwrap();
            entered.await_zero().await;
            for n in 2..=4 {
                store.send(n).await.unwrap();
            }

            let reason = tokio::time::timeout(Duration::from_secs(2), store.close_and_wait())
                .await
                .expect("teardown hung on a panicking undelivered hook");
            assert!(!reason.is_failure());
            assert!(store.is_closed());
            assert_eq!(stops.load(Ordering::SeqCst), 1);
            if with_accounting {
                assert_eq!(*lost.lock().unwrap(), vec![2, 3, 4]);
            }
        }
    }

    #[tokio::test]
    async fn test_lone_panicking_undelivered_hook_does_not_block_teardown() {
        let store = Store::<u32, u32, ()>::builder(0)
            .install(
                StorePlugin::builder()
                    .name("bad")
                    .on_undelivered_intent(|i| panic!("lost track of intent {i}"))
                    .build(),
            )
            .build()
            .unwrap();
        store.try_send(1).unwrap();
        store.try_send(2).unwrap();

        // A never-started store reports its queue on the closing caller
        store.close();
        tokio::time::timeout(Duration::from_secs(2), store.await_until_closed())
            .await
            .expect("teardown hung on a panicking undelivered hook");
        assert!(store.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_child_tasks_stop_before_close_returns() {
        init_tracing();
        let job_ticks = Arc::new(AtomicUsize::new(0));
        let child_ticks = Arc::new(AtomicUsize::new(0));
        let job_dropped = Arc::new(AtomicBool::new(false));
        let child_dropped = Arc::new(AtomicBool::new(false));

        let store = Store::<u32, u32, ()>::builder(0)
            .install(while_subscribed_plugin(1, Duration::from_secs(60), {
                let ticks = job_ticks.clone();
                let dropped = job_dropped.clone();
                move |_| {
                    let ticks = ticks.clone();
                    let flag = DropFlag(dropped.clone());
                    async move {
                        let _flag = flag;
                        // Ignores cancellation on purpose
                        for _ in 0u64.. {
                            ticks.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(1)).await;
                        }
                        Ok::<(), anyhow::Error>(())
                    }
                }
            }))
            .install(init_plugin({
                let ticks = child_ticks.clone();
                let dropped = child_dropped.clone();
                move |ctx| {
                    let ticks = ticks.clone();
                    let flag = DropFlag(dropped.clone());
                    ctx.spawn(move |_| async move {
                        let _flag = flag;
                        for _ in 0u64.. {
                            ticks.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(1)).await;
                        }
                        Ok::<(), anyhow::Error>(())
                    });
                    async { Ok(()) }
                }
            }))
            .build()
            .unwrap();
        store.start(&CancellationToken::new()).unwrap();
        let _subscription = store.subscribe().unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while job_ticks.load(Ordering::SeqCst) == 0 || child_ticks.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("child tasks never started");

        store.close_and_wait().await;
        assert!(job_dropped.load(Ordering::SeqCst), "subscriber job outlived the store");
        assert!(child_dropped.load(Ordering::SeqCst), "spawned task outlived the store");

        let (job, child) = (job_ticks.load(Ordering::SeqCst), child_ticks.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(job_ticks.load(Ordering::SeqCst), job);
        assert_eq!(child_ticks.load(Ordering::SeqCst), child);
    }
}
