//! Store core: state ownership, the intent queue and the reducer loop.
//!
//! # Lifecycle
//!
//! ```text
//! build ──► start ──► running ──► close / parent cancelled / unhandled error
//!                                   │
//!                                   ▼
//!                               teardown (exactly once)
//!                                 1. cancel child tasks and wait for them
//!                                 2. report queued intents as undelivered
//!                                 3. report buffered actions as undelivered
//!                                 4. run stop hooks, last installed first
//!                                 5. publish the stop reason
//! ```
//!
//! A store is single-use: once closed it cannot be started again.
//!
//! # Guarantees
//!
//! - **Sequential mode** (default): each intent is fully reduced, including
//!   every hook it triggers, before the next one is taken
//! - **Parallel mode**: each intent runs in its own tracked task. State
//!   updates still go through the guard, so none is lost, but their order
//!   across intents is not defined
//! - An error that no exception hook handles stops the store with
//!   [`StopReason::Failed`]
//! - Errors from start and subscription hooks are logged, never fatal

use std::collections::HashSet;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::channel::{ActionChannel, ActionReceiver};
use crate::compose::compose;
use crate::config::StoreConfiguration;
use crate::context::PipelineContext;
use crate::core::{ChainId, MviAction, MviIntent, MviState, StopReason};
use crate::decorator::{decorate, PluginDecorator};
use crate::error::{is_contract_violation, panic_error, panic_message, StoreError};
use crate::guard::StateGuard;
use crate::plugin::StorePlugin;
use crate::queue::{BoundedQueue, PushError};
use crate::subscription::SubscriberCount;

/// The reducer: turns one intent into state updates and actions.
pub type Reducer<S, I, A> =
    Arc<dyn Fn(PipelineContext<S, I, A>, I) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Closed,
}

#[derive(Debug, Clone, Copy)]
enum SubscriptionEvent {
    Subscribed(usize),
    Unsubscribed(usize),
}

// =============================================================================
// Shared state
// =============================================================================

pub(crate) struct StoreInner<S, I, A> {
    pub(crate) name: String,
    pub(crate) config: StoreConfiguration,
    pub(crate) plugin: StorePlugin<S, I, A>,
    reducer: Option<Reducer<S, I, A>>,
    pub(crate) state: watch::Sender<S>,
    pub(crate) guard: StateGuard,
    intents: BoundedQueue<I>,
    actions: ActionChannel<A>,
    pub(crate) subscribers: SubscriberCount,
    events_tx: mpsc::UnboundedSender<SubscriptionEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SubscriptionEvent>>>,
    pub(crate) token: CancellationToken,
    pub(crate) tasks: TaskTracker,
    phase: Mutex<Phase>,
    failure: Mutex<Option<Arc<anyhow::Error>>>,
    closed_tx: watch::Sender<Option<StopReason>>,
}

impl<S: MviState, I: MviIntent, A: MviAction> StoreInner<S, I, A> {
    fn context(self: &Arc<Self>, chain: Option<ChainId>) -> PipelineContext<S, I, A> {
        PipelineContext::new(self.clone(), chain)
    }

    fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    pub(crate) fn current(&self) -> S {
        self.state.borrow().clone()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.phase() == Phase::Running && !self.token.is_cancelled()
    }

    pub(crate) async fn send(&self, intent: I) -> Result<(), StoreError> {
        match self.intents.push(intent).await {
            Ok(Some(evicted)) => {
                self.report_evicted_intent(evicted);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(_) => Err(StoreError::StoreClosed),
        }
    }

    pub(crate) fn try_send(&self, intent: I) -> Result<(), StoreError> {
        match self.intents.try_push(intent) {
            Ok(Some(evicted)) => {
                self.report_evicted_intent(evicted);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(PushError::Full(_)) => Err(StoreError::IntentBufferFull),
            Err(PushError::Closed(_)) => Err(StoreError::StoreClosed),
        }
    }

    fn report_evicted_intent(&self, intent: I) {
        warn!(store = %self.name, ?intent, "intent buffer full, dropped oldest intent");
        self.plugin.undelivered_intent(intent);
    }

    pub(crate) async fn emit(&self, action: A) -> Result<(), StoreError> {
        let undelivered = |evicted: A| {
            warn!(store = %self.name, action = ?evicted, "action buffer full, dropped oldest action");
            self.plugin.undelivered_action(evicted);
        };
        self.actions.emit(action, &undelivered).await
    }

    /// Ask the store to stop.
    pub(crate) fn close(&self) {
        let never_started = {
            let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
            match *phase {
                Phase::Idle => {
                    *phase = Phase::Closed;
                    true
                }
                Phase::Running | Phase::Closed => false,
            }
        };

        self.token.cancel();
        if never_started {
            debug!(store = %self.name, "closing store that was never started");
            self.intents.close();
            self.report_leftovers();
            self.closed_tx.send_replace(Some(StopReason::Closed));
        }
    }

    // =========================================================================
    // Failure handling
    // =========================================================================

    /// Route an error from the reducer path. Stops the store if unhandled.
    pub(crate) async fn handle_failure(&self, ctx: &PipelineContext<S, I, A>, error: anyhow::Error) {
        if is_contract_violation(&error) {
            error!(store = %self.name, error = %error, "contract violation, stopping store");
            self.fail(error);
            return;
        }

        match self.offer_exception(ctx, error).await {
            None => debug!(store = %self.name, "exception handled by plugin"),
            Some(unhandled) => {
                error!(store = %self.name, error = %unhandled, "unhandled exception, stopping store");
                self.fail(unhandled);
            }
        }
    }

    /// Route an error from a lifecycle hook. Never stops the store.
    async fn supervise(&self, ctx: &PipelineContext<S, I, A>, hook: &'static str, error: anyhow::Error) {
        if is_contract_violation(&error) {
            error!(store = %self.name, hook, error = %error, "contract violation in lifecycle hook");
            return;
        }
        if let Some(unhandled) = self.offer_exception(ctx, error).await {
            error!(store = %self.name, hook, error = %unhandled, "lifecycle hook failed");
        }
    }

    async fn offer_exception(
        &self,
        ctx: &PipelineContext<S, I, A>,
        error: anyhow::Error,
    ) -> Option<anyhow::Error> {
        match AssertUnwindSafe(self.plugin.exception(ctx.clone(), error))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(payload) => Some(panic_error(payload)),
        }
    }

    fn fail(&self, error: anyhow::Error) {
        {
            let mut failure = self.failure.lock().unwrap_or_else(|e| e.into_inner());
            if failure.is_none() {
                *failure = Some(Arc::new(error));
            }
        }
        self.token.cancel();
    }

    // =========================================================================
    // Reducer loop
    // =========================================================================

    async fn run(self: Arc<Self>) {
        let ctx = self.context(None);
        info!(
            store = %self.name,
            parallel = self.config.parallel_intents,
            "store started"
        );

        let started = AssertUnwindSafe(self.plugin.start(ctx.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panic_error(payload)));
        if let Err(e) = started {
            self.supervise(&ctx, "on_start", e).await;
        }

        let events = self
            .events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(events) = events {
            self.tasks.spawn(self.clone().forward_subscriptions(events));
        }

        self.reduce_loop().await;
        self.teardown().await;
    }

    async fn reduce_loop(self: &Arc<Self>) {
        loop {
            let intent = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                next = self.intents.pop() => match next {
                    Some(intent) => intent,
                    None => break,
                },
            };

            if self.config.parallel_intents {
                let inner = self.clone();
                self.tasks.spawn(async move {
                    let token = inner.token.clone();
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = inner.process_intent(intent) => {}
                    }
                });
            } else {
                tokio::select! {
                    _ = self.token.cancelled() => break,
                    _ = self.process_intent(intent) => {}
                }
            }
        }
    }

    async fn process_intent(self: &Arc<Self>, intent: I) {
        let ctx = self.context(None);
        let result = AssertUnwindSafe(self.reduce(ctx.clone(), intent))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panic_error(payload)));

        if let Err(e) = result {
            self.handle_failure(&ctx, e).await;
        }
    }

    async fn reduce(&self, ctx: PipelineContext<S, I, A>, intent: I) -> anyhow::Result<()> {
        let Some(intent) = self.plugin.intent(ctx.clone(), intent).await? else {
            trace!(store = %self.name, "intent absorbed by plugin");
            return Ok(());
        };

        match &self.reducer {
            Some(reducer) => reducer(ctx, intent).await,
            None if self.config.debuggable => Err(StoreError::UnhandledIntent {
                intent: format!("{intent:?}"),
            }
            .into()),
            None => {
                trace!(store = %self.name, ?intent, "no reducer installed, intent ignored");
                Ok(())
            }
        }
    }

    async fn forward_subscriptions(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<SubscriptionEvent>,
    ) {
        let ctx = self.context(None);
        loop {
            let event = tokio::select! {
                _ = self.token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let (hook, outcome) = match event {
                SubscriptionEvent::Subscribed(count) => (
                    "on_subscribe",
                    AssertUnwindSafe(self.plugin.subscribe(ctx.clone(), count))
                        .catch_unwind()
                        .await,
                ),
                SubscriptionEvent::Unsubscribed(count) => (
                    "on_unsubscribe",
                    AssertUnwindSafe(self.plugin.unsubscribe(ctx.clone(), count))
                        .catch_unwind()
                        .await,
                ),
            };
            if let Err(e) = outcome.unwrap_or_else(|payload| Err(panic_error(payload))) {
                self.supervise(&ctx, hook, e).await;
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    async fn teardown(&self) {
        self.token.cancel();
        self.intents.close();
        self.tasks.close();
        self.tasks.wait().await;

        self.report_leftovers();

        let reason = match self
            .failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            Some(error) => StopReason::Failed(error),
            None => StopReason::Closed,
        };

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.plugin.stop(reason.clone()))) {
            error!(
                store = %self.name,
                panic = %panic_message(payload.as_ref()),
                "stop hook panicked"
            );
        }

        self.set_phase(Phase::Closed);
        info!(store = %self.name, %reason, "store stopped");
        self.closed_tx.send_replace(Some(reason));
    }

    fn report_leftovers(&self) {
        let intents = self.intents.drain();
        let actions = self.actions.close();
        if !intents.is_empty() || !actions.is_empty() {
            warn!(
                store = %self.name,
                intents = intents.len(),
                actions = actions.len(),
                "reporting undelivered items"
            );
        }
        for intent in intents {
            self.plugin.undelivered_intent(intent);
        }
        for action in actions {
            self.plugin.undelivered_action(action);
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Store`].
///
/// ```ignore
/// let store = Store::builder(Counter::default())
///     .configure(StoreConfiguration::default().with_name("counter"))
///     .install(logging_plugin("counter"))
///     .reduce(|ctx, intent| async move { /* ... */ Ok(()) })
///     .build()?;
/// ```
pub struct StoreBuilder<S, I, A> {
    initial: S,
    config: StoreConfiguration,
    plugins: Vec<StorePlugin<S, I, A>>,
    decorators: Vec<PluginDecorator<S, I, A>>,
    reducer: Option<Reducer<S, I, A>>,
}

impl<S: MviState, I: MviIntent, A: MviAction> StoreBuilder<S, I, A> {
    pub fn configure(mut self, config: StoreConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Install a plugin. Forward hooks run in installation order.
    pub fn install(mut self, plugin: StorePlugin<S, I, A>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Wrap the whole plugin chain. The first decorator added is the
    /// outermost layer.
    pub fn decorate(mut self, decorator: PluginDecorator<S, I, A>) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Set the reducer.
    pub fn reduce<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PipelineContext<S, I, A>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.reducer = Some(Arc::new(move |ctx, intent| f(ctx, intent).boxed()));
        self
    }

    /// Validate the configuration and assemble the store.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfiguration`] for zero capacities,
    /// [`StoreError::DuplicatePlugin`] when two plugins share a name.
    pub fn build(self) -> Result<Store<S, I, A>, StoreError> {
        self.config.validate()?;

        let mut seen = HashSet::new();
        for name in self.plugins.iter().filter_map(StorePlugin::name) {
            if !seen.insert(name) {
                return Err(StoreError::DuplicatePlugin {
                    name: name.to_string(),
                });
            }
        }

        let verify = self.config.effective_verification();
        let plugin = decorate(compose(self.plugins), &self.decorators, verify);

        let (state, _) = watch::channel(self.initial);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(None);

        let inner = StoreInner {
            name: self.config.display_name().to_string(),
            plugin,
            reducer: self.reducer,
            state,
            guard: StateGuard::new(self.config.state_strategy),
            intents: BoundedQueue::new(self.config.intent_capacity, self.config.on_overflow),
            actions: ActionChannel::new(&self.config.action_share_behavior),
            subscribers: SubscriberCount::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            token: CancellationToken::new(),
            tasks: TaskTracker::new(),
            phase: Mutex::new(Phase::Idle),
            failure: Mutex::new(None),
            closed_tx,
            config: self.config,
        };

        Ok(Store {
            inner: Arc::new(inner),
        })
    }
}

// =============================================================================
// Store
// =============================================================================

/// A single-writer state container driven by intents.
pub struct Store<S, I, A> {
    inner: Arc<StoreInner<S, I, A>>,
}

impl<S, I, A> Clone for Store<S, I, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, I, A> std::fmt::Debug for Store<S, I, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl<S: MviState, I: MviIntent, A: MviAction> Store<S, I, A> {
    pub fn builder(initial: S) -> StoreBuilder<S, I, A> {
        StoreBuilder {
            initial,
            config: StoreConfiguration::default(),
            plugins: Vec::new(),
            decorators: Vec::new(),
            reducer: None,
        }
    }

    /// Bind the store to `parent` and start the reducer loop.
    ///
    /// Cancelling `parent` closes the store.
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyStarted`] on a second call,
    /// [`StoreError::StoreClosed`] after the store has been closed.
    pub fn start(&self, parent: &CancellationToken) -> Result<StoreHandle, StoreError> {
        {
            let mut phase = self.inner.phase.lock().unwrap_or_else(|e| e.into_inner());
            match *phase {
                Phase::Idle => *phase = Phase::Running,
                Phase::Running => return Err(StoreError::AlreadyStarted),
                Phase::Closed => return Err(StoreError::StoreClosed),
            }
        }

        let token = self.inner.token.clone();
        let parent = parent.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => token.cancel(),
                _ = token.cancelled() => {}
            }
        });

        let join = tokio::spawn(self.inner.clone().run());
        Ok(StoreHandle {
            token: self.inner.token.clone(),
            join,
            closed: self.inner.closed_tx.subscribe(),
        })
    }

    /// Queue an intent. Suspends only while the queue is full under the
    /// suspend overflow policy.
    pub async fn send(&self, intent: I) -> Result<(), StoreError> {
        self.inner.send(intent).await
    }

    /// Queue an intent without waiting.
    ///
    /// # Errors
    ///
    /// [`StoreError::IntentBufferFull`] when the queue is full under the
    /// suspend policy.
    pub fn try_send(&self, intent: I) -> Result<(), StoreError> {
        self.inner.try_send(intent)
    }

    /// Attach a subscriber.
    ///
    /// # Errors
    ///
    /// [`StoreError::SubscriberAlreadyAttached`] under the restrict
    /// discipline while another subscriber is attached.
    pub fn subscribe(&self) -> Result<Subscription<S, A>, StoreError> {
        if self.inner.phase() == Phase::Closed {
            return Err(StoreError::StoreClosed);
        }
        let actions = self.inner.actions.subscribe()?;
        let count = self.inner.subscribers.increment();
        let _ = self.inner.events_tx.send(SubscriptionEvent::Subscribed(count));
        debug!(store = %self.inner.name, subscribers = count, "subscriber attached");

        Ok(Subscription {
            state: self.inner.state.subscribe(),
            actions,
            closed: self.inner.closed_tx.subscribe(),
            _detach: DetachGuard {
                count: self.inner.subscribers.clone(),
                events: self.inner.events_tx.clone(),
            },
        })
    }

    /// Attach a subscriber driven by callbacks.
    ///
    /// `on_state` first receives the current state, then every published
    /// state. The callbacks stop when the handle is cancelled or the store
    /// closes.
    pub fn subscribe_with<FS, FA>(
        &self,
        mut on_state: FS,
        mut on_action: FA,
    ) -> Result<SubscriptionHandle, StoreError>
    where
        FS: FnMut(S) + Send + 'static,
        FA: FnMut(A) + Send + 'static,
    {
        let Subscription {
            mut state,
            mut actions,
            mut closed,
            _detach,
        } = self.subscribe()?;

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let join = tokio::spawn(async move {
            let _detach = _detach;
            on_state(state.borrow_and_update().clone());
            let mut actions_open = true;

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let next = state.borrow_and_update().clone();
                        on_state(next);
                    }
                    action = actions.recv(), if actions_open => match action {
                        Some(action) => on_action(action),
                        None => actions_open = false,
                    },
                    _ = wait_closed(&mut closed) => break,
                }
            }
        });

        Ok(SubscriptionHandle { token, join })
    }

    /// Read the state through the guard.
    pub async fn state(&self) -> Result<S, StoreError> {
        let inner = &self.inner;
        inner
            .guard
            .transaction(None, |_| async move { inner.current() })
            .await
    }

    /// Read the state without the guard.
    pub fn delicate_state(&self) -> S {
        self.inner.current()
    }

    /// Ask the store to stop. Returns immediately.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Stop the store and wait for teardown to finish.
    pub async fn close_and_wait(&self) -> StopReason {
        self.close();
        self.await_until_closed().await
    }

    /// Wait until the store has stopped.
    pub async fn await_until_closed(&self) -> StopReason {
        let mut closed = self.inner.closed_tx.subscribe();
        wait_closed(&mut closed).await.unwrap_or(StopReason::Closed)
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.phase() == Phase::Closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.get()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &StoreConfiguration {
        &self.inner.config
    }

    /// A context onto this store, outside any transaction.
    pub fn context(&self) -> PipelineContext<S, I, A> {
        self.inner.context(None)
    }
}

async fn wait_closed(closed: &mut watch::Receiver<Option<StopReason>>) -> Option<StopReason> {
    match closed.wait_for(Option::is_some).await {
        Ok(reason) => reason.clone(),
        Err(_) => None,
    }
}

/// Handle returned by [`Store::start`].
#[derive(Debug)]
pub struct StoreHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
    closed: watch::Receiver<Option<StopReason>>,
}

impl StoreHandle {
    /// Ask the store to stop.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the store task to finish and return why it stopped.
    pub async fn wait(mut self) -> StopReason {
        if let Err(e) = self.join.await {
            error!(error = %e, "store task ended abnormally");
        }
        wait_closed(&mut self.closed)
            .await
            .unwrap_or(StopReason::Closed)
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Decrements the subscriber count when a subscription goes away.
struct DetachGuard {
    count: SubscriberCount,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        let count = self.count.decrement();
        let _ = self.events.send(SubscriptionEvent::Unsubscribed(count));
        trace!(subscribers = count, "subscriber detached");
    }
}

/// A live observer of a store.
///
/// Counts toward the store's subscriber count until dropped.
pub struct Subscription<S, A> {
    state: watch::Receiver<S>,
    actions: ActionReceiver<A>,
    closed: watch::Receiver<Option<StopReason>>,
    _detach: DetachGuard,
}

impl<S: MviState, A: MviAction> Subscription<S, A> {
    /// The latest published state.
    pub fn state(&self) -> S {
        self.state.borrow().clone()
    }

    /// Wait for the next published state. Returns `None` once the store has
    /// stopped.
    pub async fn next_state(&mut self) -> Option<S> {
        tokio::select! {
            biased;
            changed = self.state.changed() => match changed {
                Ok(()) => Some(self.state.borrow_and_update().clone()),
                Err(_) => None,
            },
            _ = wait_closed(&mut self.closed) => None,
        }
    }

    /// Wait for the next action delivered to this subscriber.
    pub async fn next_action(&mut self) -> Option<A> {
        self.actions.recv().await
    }

    pub fn try_next_action(&mut self) -> Option<A> {
        self.actions.try_recv()
    }

    /// A standalone receiver of state snapshots.
    pub fn state_receiver(&self) -> watch::Receiver<S> {
        self.state.clone()
    }
}

impl<S, A> std::fmt::Debug for Subscription<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Handle returned by [`Store::subscribe_with`].
#[derive(Debug)]
pub struct SubscriptionHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Detach the subscriber.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the callback task to end.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            warn!(error = %e, "subscriber task ended abnormally");
        }
    }
}
