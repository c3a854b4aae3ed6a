use crate::{config::RefreshConfig, types::EntityState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OtherEntity,
    Duplicate,
    RateLimited { elapsed_ms: u64, remaining_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    Render(EntityState),
    Skip(SkipReason),
}

impl RefreshDecision {
    pub fn should_render(self) -> bool {
        matches!(self, Self::Render(_))
    }
}

#[derive(Debug, Clone)]
pub struct RefreshController {
    config: RefreshConfig,

    current_known_state: EntityState,
    // None once a write failed and the panel content is unknown.
    rendered_state: Option<EntityState>,
    pending_state: Option<EntityState>,

    last_refresh_ms: u64,
}

impl RefreshController {
    /// The returned state must be drawn right away, outside the rate limit.
    pub fn bootstrap(
        config: RefreshConfig,
        fetched: Option<EntityState>,
        now_ms: u64,
    ) -> (Self, EntityState) {
        let state = fetched.unwrap_or(EntityState::Inactive);
        let controller = Self {
            config,
            current_known_state: state,
            rendered_state: Some(state),
            pending_state: None,
            last_refresh_ms: now_ms,
        };
        (controller, state)
    }

    pub fn entity_id(&self) -> &str {
        &self.config.entity_id
    }

    pub fn current_known_state(&self) -> EntityState {
        self.current_known_state
    }

    pub fn rendered_state(&self) -> Option<EntityState> {
        self.rendered_state
    }

    pub fn pending_state(&self) -> Option<EntityState> {
        self.pending_state
    }

    pub fn last_refresh_ms(&self) -> u64 {
        self.last_refresh_ms
    }

    pub fn observe(&mut self, entity_id: &str, state: EntityState, now_ms: u64) -> RefreshDecision {
        if entity_id != self.config.entity_id {
            return RefreshDecision::Skip(SkipReason::OtherEntity);
        }

        if state == self.current_known_state && self.rendered_state.is_some() {
            return RefreshDecision::Skip(SkipReason::Duplicate);
        }

        let elapsed_ms = now_ms.saturating_sub(self.last_refresh_ms);
        if elapsed_ms >= self.config.min_refresh_ms {
            self.apply_render(state, now_ms);
            return RefreshDecision::Render(state);
        }

        // Track the latest truth without touching the refresh timestamp.
        self.current_known_state = state;
        self.pending_state = (self.rendered_state != Some(state)).then_some(state);

        RefreshDecision::Skip(SkipReason::RateLimited {
            elapsed_ms,
            remaining_ms: self.config.min_refresh_ms - elapsed_ms,
        })
    }

    /// The last decided render never reached the panel. Keeps the refresh
    /// timestamp; the next observation of the entity is not a duplicate.
    pub fn render_failed(&mut self) {
        self.rendered_state = None;
        self.pending_state = None;
    }

    pub fn catch_up_deadline(&self) -> Option<u64> {
        if !self.config.catch_up {
            return None;
        }
        self.pending_state
            .map(|_| self.last_refresh_ms.saturating_add(self.config.min_refresh_ms))
    }

    pub fn take_catch_up(&mut self, now_ms: u64) -> Option<EntityState> {
        let deadline = self.catch_up_deadline()?;
        if now_ms < deadline {
            return None;
        }
        let state = self.pending_state?;
        self.apply_render(state, now_ms);
        Some(state)
    }

    fn apply_render(&mut self, state: EntityState, now_ms: u64) {
        self.current_known_state = state;
        self.rendered_state = Some(state);
        self.pending_state = None;
        self.last_refresh_ms = now_ms;
    }
}
