use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use epaper_dnd_common::{
    protocol::EVENT_STATE_CHANGED, ConnectionPhase, EntityState, Frame, LossReason,
    ReconnectConfig, ReconnectPolicy, RefreshConfig, RefreshController, RefreshDecision, Renderer,
    SkipReason, StateChange,
};

use crate::{
    display::{Display, DisplayError},
    hub::{HubConnector, HubError, HubSession},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub renders: u64,
    pub render_failures: u64,
    pub sessions: u64,
    pub connection_losses: u64,
}

pub struct RefreshService<H, D, R> {
    hub: H,
    display: D,
    renderer: R,
    refresh: RefreshConfig,
    policy: ReconnectPolicy,
    phase: ConnectionPhase,
    started: Instant,
    stats: ServiceStats,
}

impl<H, D, R> RefreshService<H, D, R>
where
    H: HubConnector,
    D: Display,
    R: Renderer,
{
    pub fn new(
        hub: H,
        display: D,
        renderer: R,
        refresh: RefreshConfig,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self {
            hub,
            display,
            renderer,
            refresh,
            policy: ReconnectPolicy::new(reconnect),
            phase: ConnectionPhase::Disconnected,
            started: Instant::now(),
            stats: ServiceStats::default(),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub async fn run(&mut self, cancel: CancellationToken) -> ServiceStats {
        let bootstrapped = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            controller = self.bootstrap() => Some(controller),
        };

        if let Some(mut controller) = bootstrapped {
            self.supervise(&mut controller, &cancel).await;
        }

        self.transition(ConnectionPhase::Stopped);
        info!("shutting down, putting display to sleep");
        if let Err(err) = self.display.sleep() {
            warn!("failed to put display to sleep on shutdown: {err}");
        }
        self.stats
    }

    async fn bootstrap(&mut self) -> RefreshController {
        let entity_id = self.refresh.entity_id.clone();
        let fetched = match self.hub.fetch_state(&entity_id).await {
            Ok(raw) => {
                info!("initial state of {entity_id}: {raw}");
                Some(EntityState::from_raw(&raw))
            }
            Err(err) => {
                warn!("failed to fetch initial state of {entity_id}, assuming off: {err}");
                None
            }
        };

        let (mut controller, state) =
            RefreshController::bootstrap(self.refresh.clone(), fetched, self.now_ms());
        if !self.render(state, true) {
            controller.render_failed();
        }
        controller
    }

    async fn supervise(&mut self, controller: &mut RefreshController, cancel: &CancellationToken) {
        loop {
            self.transition(ConnectionPhase::Connecting);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                outcome = self.listen(controller) => outcome,
            };

            let reason = match outcome {
                Ok(()) => {
                    warn!("hub closed the event stream");
                    LossReason::Dropped
                }
                Err(err) => {
                    warn!("hub connection lost: {err}");
                    err.loss_reason()
                }
            };
            self.stats.connection_losses += 1;
            self.transition(ConnectionPhase::ConnectionLost(reason));

            let delay = Duration::from_millis(self.policy.delay_ms(reason));
            info!("reconnecting in {}s", delay.as_secs());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    // Ok means the hub ended the stream cleanly.
    async fn listen(&mut self, controller: &mut RefreshController) -> Result<(), HubError> {
        let mut session = self.hub.connect().await?;
        session.authenticate().await?;
        self.transition(ConnectionPhase::Authenticated);

        session.subscribe(EVENT_STATE_CHANGED).await?;
        self.transition(ConnectionPhase::Subscribed);
        self.transition(ConnectionPhase::Listening);
        self.stats.sessions += 1;
        info!("listening for changes to {}", controller.entity_id());

        self.resync(controller).await;

        loop {
            let next = match controller.catch_up_deadline() {
                Some(deadline_ms) => {
                    let wait = Duration::from_millis(deadline_ms.saturating_sub(self.now_ms()));
                    tokio::select! {
                        next = session.next_event() => next?,
                        _ = tokio::time::sleep(wait) => {
                            self.catch_up(controller);
                            continue;
                        }
                    }
                }
                None => session.next_event().await?,
            };

            match next {
                Some(change) => self.handle_change(controller, &change),
                None => return Ok(()),
            }
        }
    }

    async fn resync(&mut self, controller: &mut RefreshController) {
        let entity_id = controller.entity_id().to_string();
        match self.hub.fetch_state(&entity_id).await {
            Ok(raw) => {
                let change = StateChange {
                    entity_id,
                    old_state: None,
                    new_state: raw,
                };
                self.handle_change(controller, &change);
            }
            Err(err) => warn!("failed to resync {entity_id}: {err}"),
        }
    }

    fn handle_change(&mut self, controller: &mut RefreshController, change: &StateChange) {
        let previous = controller.current_known_state();
        let state = change.state();

        match controller.observe(&change.entity_id, state, self.now_ms()) {
            RefreshDecision::Render(state) => {
                info!("{} changed: {previous} -> {state}", change.entity_id);
                if !self.render(state, false) {
                    controller.render_failed();
                }
            }
            RefreshDecision::Skip(SkipReason::OtherEntity) => {
                trace!("ignoring change to {}", change.entity_id);
            }
            RefreshDecision::Skip(SkipReason::Duplicate) => {
                debug!("{} still {state}", change.entity_id);
            }
            RefreshDecision::Skip(SkipReason::RateLimited {
                elapsed_ms,
                remaining_ms,
            }) => {
                info!(
                    "skipping refresh to {state}, too soon ({:.1}s since last, {:.1}s to go)",
                    elapsed_ms as f64 / 1000.0,
                    remaining_ms as f64 / 1000.0
                );
            }
        }
    }

    fn catch_up(&mut self, controller: &mut RefreshController) {
        if let Some(state) = controller.take_catch_up(self.now_ms()) {
            info!("drawing deferred state {state}");
            if !self.render(state, false) {
                controller.render_failed();
            }
        }
    }

    // True when the frame reached the panel.
    fn render(&mut self, state: EntityState, clear_first: bool) -> bool {
        let frame = self.renderer.render(state, self.display.size());
        info!("updating {} display: {state}", self.display.name());

        let written = match self.write_frame(&frame, clear_first) {
            Ok(()) => {
                self.stats.renders += 1;
                true
            }
            Err(err) => {
                self.stats.render_failures += 1;
                error!("display update to {state} failed: {err}");
                false
            }
        };

        if let Err(err) = self.display.sleep() {
            warn!("failed to put display to sleep: {err}");
        }
        written
    }

    fn write_frame(&mut self, frame: &Frame, clear_first: bool) -> Result<(), DisplayError> {
        self.display.initialize()?;
        if clear_first {
            self.display.clear()?;
        }
        self.display.show_frame(&frame.primary, &frame.accent)
    }

    fn transition(&mut self, next: ConnectionPhase) {
        if !self.phase.can_transition_to(next) {
            warn!("unexpected connection phase change {} -> {next}", self.phase);
        }
        debug!("connection phase {} -> {next}", self.phase);
        self.phase = next;
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
