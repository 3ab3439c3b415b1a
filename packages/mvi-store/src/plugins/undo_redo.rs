//! Undo and redo over published state snapshots.
//!
//! ```ignore
//! let history = UndoRedo::new(50);
//! let store = Store::builder(Document::default())
//!     .install(history.plugin())
//!     .reduce(move |ctx, intent| {
//!         let history = history.clone();
//!         async move {
//!             match intent {
//!                 Edit::Undo => { history.undo(&ctx).await?; }
//!                 Edit::Redo => { history.redo(&ctx).await?; }
//!                 Edit::Type(text) => ctx.update_state(|doc| doc.append(&text)).await?,
//!             }
//!             Ok(())
//!         }
//!     })
//!     .build()?;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::context::PipelineContext;
use crate::core::{MviAction, MviIntent, MviState};
use crate::plugin::StorePlugin;

#[derive(Debug)]
struct History<S> {
    undo: VecDeque<S>,
    redo: Vec<S>,
    restoring: bool,
}

/// Bounded undo/redo history shared between a plugin and the reducer.
#[derive(Debug)]
pub struct UndoRedo<S> {
    history: Arc<Mutex<History<S>>>,
    max_depth: usize,
}

impl<S> Clone for UndoRedo<S> {
    fn clone(&self) -> Self {
        Self {
            history: self.history.clone(),
            max_depth: self.max_depth,
        }
    }
}

impl<S: MviState> UndoRedo<S> {
    /// Keep at most `max_depth` undo steps.
    pub fn new(max_depth: usize) -> Self {
        Self {
            history: Arc::new(Mutex::new(History {
                undo: VecDeque::new(),
                redo: Vec::new(),
                restoring: false,
            })),
            max_depth: max_depth.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, History<S>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Plugin recording every state change as an undo step.
    ///
    /// Install it after plugins that may discard or rewrite state changes.
    pub fn plugin<I: MviIntent, A: MviAction>(&self) -> StorePlugin<S, I, A> {
        let recorder = self.clone();
        StorePlugin::builder()
            .name("undo_redo")
            .on_state(move |_, old, new| {
                recorder.record(old);
                async move { Ok(Some(new)) }
            })
            .build()
    }

    fn record(&self, old: S) {
        let mut history = self.lock();
        if history.restoring {
            return;
        }
        history.undo.push_back(old);
        while history.undo.len() > self.max_depth {
            history.undo.pop_front();
        }
        history.redo.clear();
    }

    /// Restore the previous snapshot. Returns `false` when there is nothing
    /// to undo.
    pub async fn undo<I: MviIntent, A: MviAction>(&self, ctx: &PipelineContext<S, I, A>) -> anyhow::Result<bool> {
        self.step(ctx, Direction::Undo).await
    }

    /// Re-apply the last undone snapshot. Returns `false` when there is
    /// nothing to redo.
    pub async fn redo<I: MviIntent, A: MviAction>(&self, ctx: &PipelineContext<S, I, A>) -> anyhow::Result<bool> {
        self.step(ctx, Direction::Redo).await
    }

    async fn step<I: MviIntent, A: MviAction>(
        &self,
        ctx: &PipelineContext<S, I, A>,
        direction: Direction,
    ) -> anyhow::Result<bool> {
        let this = self.clone();
        ctx.with_state(move |ctx, current| async move {
            let target = {
                let mut history = this.lock();
                let target = match direction {
                    Direction::Undo => history.undo.pop_back(),
                    Direction::Redo => history.redo.pop(),
                };
                let Some(target) = target else {
                    return Ok(false);
                };
                match direction {
                    Direction::Undo => history.redo.push(current),
                    Direction::Redo => history.undo.push_back(current),
                }
                history.restoring = true;
                target
            };

            trace!(?direction, "restoring snapshot");
            let restored = ctx.update_state(move |_| target).await;
            this.lock().restoring = false;
            restored.map(|()| true)
        })
        .await
    }

    pub fn can_undo(&self) -> bool {
        !self.lock().undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.lock().redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.lock().undo.len()
    }

    /// Forget all history.
    pub fn reset(&self) {
        let mut history = self.lock();
        history.undo.clear();
        history.redo.clear();
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Undo,
    Redo,
}
