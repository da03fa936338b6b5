//! The dragon-lord guard.
//!
//! Runs on every human group message before the bot composes a reply, and
//! again after each bot message has been sent. The first path counts the
//! message and decides whether the bot may speak; the second only keeps the
//! bot's own tally current.
//!
//! The increment and the two reads behind a decision are separate store
//! calls. A concurrent message in the same group can land between them, so
//! a decision reflects the group as of a moment just after this message was
//! counted, not a single snapshot.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::GuardConfig;
use crate::guard::event::{HostEvent, MessageKind};
use crate::guard::policy::{self, GroupFilter};
use crate::store::CounterStore;

/// Tallies behind a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Standing {
    pub bot_count: u64,
    pub max_count: u64,
    pub effective_max: i64,
}

/// Why an event was passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotGroupMessage,
    GroupNotAllowed,
}

/// Outcome of a human group message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Not this guard's concern; nothing was counted.
    Ignored(IgnoreReason),
    /// The bot may reply.
    Allow(Standing),
    /// The bot has caught up with the leader; its reply was withheld.
    Suppress(Standing),
}

impl Decision {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Decision::Suppress(_))
    }

    pub fn standing(&self) -> Option<Standing> {
        match self {
            Decision::Allow(s) | Decision::Suppress(s) => Some(*s),
            Decision::Ignored(_) => None,
        }
    }
}

/// Keeps the bot from becoming the most active poster in a group.
pub struct DragonLordGuard {
    store: Arc<CounterStore>,
    filter: GroupFilter,
    fault_tolerance: u64,
}

impl DragonLordGuard {
    pub fn new(store: Arc<CounterStore>, filter: GroupFilter, fault_tolerance: u64) -> Self {
        Self {
            store,
            filter,
            fault_tolerance,
        }
    }

    /// Build from a config snapshot.
    pub fn from_config(store: Arc<CounterStore>, config: &GuardConfig) -> Self {
        Self::new(
            store,
            GroupFilter::new(config.white_list_groups.iter().cloned()),
            config.fault_tolerance,
        )
    }

    pub fn store(&self) -> &Arc<CounterStore> {
        &self.store
    }

    /// Count a human group message and decide whether the bot may reply.
    ///
    /// On suppression the event is cleared and stopped.
    pub async fn on_group_message(&self, event: &mut dyn HostEvent) -> Decision {
        if event.kind() != MessageKind::Group {
            return Decision::Ignored(IgnoreReason::NotGroupMessage);
        }
        if !self.filter.admits(event.group_id()) {
            debug!(group_id = event.group_id(), "Group not in white list, skipping");
            return Decision::Ignored(IgnoreReason::GroupNotAllowed);
        }

        let group_id = event.group_id().to_string();
        if !self.store.increment(&group_id, event.sender_id()).await {
            warn!(group_id = %group_id, "Tally not updated, letting the reply through");
            return Decision::Allow(Standing::default());
        }

        let standing = self.standing(&group_id, event.self_id()).await;

        if policy::should_suppress(standing.bot_count, standing.max_count, self.fault_tolerance) {
            info!(
                group_id = %group_id,
                bot_count = standing.bot_count,
                max_count = standing.max_count,
                effective_max = standing.effective_max,
                "<dragon lord> group max reached, withholding reply"
            );
            event.clear_result();
            event.stop_event();
            Decision::Suppress(standing)
        } else {
            info!(
                group_id = %group_id,
                bot_count = standing.bot_count,
                max_count = standing.max_count,
                effective_max = standing.effective_max,
                "<dragon lord> bot below group max"
            );
            Decision::Allow(standing)
        }
    }

    /// Count a message the bot has just sent. Returns whether it was recorded.
    pub async fn on_message_sent(&self, event: &dyn HostEvent) -> bool {
        if !self.filter.admits(event.group_id()) {
            debug!(group_id = event.group_id(), "Group not in white list, skipping");
            return false;
        }
        self.store.increment(event.group_id(), event.self_id()).await
    }

    /// Current tallies for the bot in `group_id`, read without counting anything.
    pub async fn standing(&self, group_id: &str, self_id: &str) -> Standing {
        let max_count = self.store.max_count(group_id).await;
        let bot_count = self.store.sender_count(group_id, self_id).await;
        Standing {
            bot_count,
            max_count,
            effective_max: policy::effective_max(max_count, self.fault_tolerance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::event::GroupMessage;
    use crate::store::{LibSqlBackend, ResetSchedule, SystemClock};

    const BOT: &str = "bot";

    async fn guard(white_list: &[&str], fault_tolerance: u64) -> DragonLordGuard {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let store = CounterStore::with_backend(
            Arc::new(backend),
            ResetSchedule::default(),
            Arc::new(SystemClock),
        );
        DragonLordGuard::new(
            Arc::new(store),
            GroupFilter::new(white_list.iter().copied()),
            fault_tolerance,
        )
    }

    async fn human(guard: &DragonLordGuard, group: &str, sender: &str) -> (Decision, GroupMessage) {
        let mut event = GroupMessage::new(group, sender, BOT, "hi");
        let decision = guard.on_group_message(&mut event).await;
        (decision, event)
    }

    async fn bot_sent(guard: &DragonLordGuard, group: &str) -> bool {
        guard
            .on_message_sent(&GroupMessage::sent_by_self(group, BOT, "reply"))
            .await
    }

    #[tokio::test]
    async fn leader_scenario() {
        let guard = guard(&[], 0).await;

        for _ in 0..3 {
            let (decision, event) = human(&guard, "G1", "U1").await;
            assert!(!decision.is_suppressed());
            assert!(!event.is_suppressed());
        }
        assert_eq!(guard.store().sender_count("G1", "U1").await, 3);

        assert!(bot_sent(&guard, "G1").await);
        let (decision, _) = human(&guard, "G1", "U2").await;
        assert_eq!(
            decision,
            Decision::Allow(Standing {
                bot_count: 1,
                max_count: 3,
                effective_max: 3
            })
        );

        assert!(bot_sent(&guard, "G1").await);
        assert!(bot_sent(&guard, "G1").await);

        let (decision, event) = human(&guard, "G1", "U2").await;
        assert!(decision.is_suppressed());
        assert!(event.cleared);
        assert!(event.stopped);
        assert_eq!(decision.standing().unwrap().bot_count, 3);
        assert_eq!(decision.standing().unwrap().max_count, 3);
        guard.store().close().await;
    }

    #[tokio::test]
    async fn leader_posting_again_lifts_suppression() {
        let guard = guard(&[], 0).await;
        human(&guard, "G1", "U1").await;
        bot_sent(&guard, "G1").await;
        bot_sent(&guard, "G1").await;

        // U1 at 2 after this message, bot at 2.
        let (decision, _) = human(&guard, "G1", "U1").await;
        assert!(decision.is_suppressed());

        // U1 at 3, bot still 2.
        let (decision, _) = human(&guard, "G1", "U1").await;
        assert!(!decision.is_suppressed());
        guard.store().close().await;
    }

    #[tokio::test]
    async fn fault_tolerance_scenario() {
        let guard = guard(&[], 2).await;
        for _ in 0..4 {
            human(&guard, "G1", "U1").await;
        }
        for _ in 0..3 {
            bot_sent(&guard, "G1").await;
        }

        // U1 reaches 5, effective max 3, bot 3.
        let (decision, _) = human(&guard, "G1", "U1").await;
        assert_eq!(
            decision,
            Decision::Suppress(Standing {
                bot_count: 3,
                max_count: 5,
                effective_max: 3
            })
        );
        guard.store().close().await;
    }

    #[tokio::test]
    async fn groups_are_independent() {
        let guard = guard(&[], 0).await;
        for _ in 0..3 {
            bot_sent(&guard, "G1").await;
        }
        for _ in 0..5 {
            human(&guard, "G2", "U1").await;
        }

        let (decision, _) = human(&guard, "G2", "U2").await;
        assert_eq!(decision.standing().unwrap().bot_count, 0);
        assert!(!decision.is_suppressed());
        guard.store().close().await;
    }

    #[tokio::test]
    async fn white_list_blocks_both_paths() {
        let guard = guard(&["G1"], 0).await;

        let (decision, event) = human(&guard, "G2", "U1").await;
        assert_eq!(decision, Decision::Ignored(IgnoreReason::GroupNotAllowed));
        assert!(!event.cleared && !event.stopped);
        assert!(!bot_sent(&guard, "G2").await);
        assert_eq!(guard.store().max_count("G2").await, 0);

        let (decision, _) = human(&guard, "G1", "U1").await;
        assert!(decision.standing().is_some());
        assert!(bot_sent(&guard, "G1").await);
        assert_eq!(guard.store().sender_count("G1", BOT).await, 1);
        guard.store().close().await;
    }

    #[tokio::test]
    async fn private_messages_are_ignored() {
        let guard = guard(&[], 0).await;
        let mut event = GroupMessage::private("U1", BOT, "hello");
        let decision = guard.on_group_message(&mut event).await;
        assert_eq!(decision, Decision::Ignored(IgnoreReason::NotGroupMessage));
        assert_eq!(guard.store().max_count("").await, 0);
        guard.store().close().await;
    }

    #[tokio::test]
    async fn store_failure_lets_reply_through() {
        let guard = guard(&[], 0).await;
        guard.store().close().await;

        let (decision, event) = human(&guard, "G1", "U1").await;
        assert_eq!(decision, Decision::Allow(Standing::default()));
        assert!(!event.is_suppressed());
        assert!(!bot_sent(&guard, "G1").await);
    }

    #[tokio::test]
    async fn from_config_applies_policy() {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let store = Arc::new(CounterStore::with_backend(
            Arc::new(backend),
            ResetSchedule::default(),
            Arc::new(SystemClock),
        ));
        let config = GuardConfig {
            white_list_groups: vec!["G1".into()],
            fault_tolerance: 1,
            ..GuardConfig::default()
        };
        let guard = DragonLordGuard::from_config(store, &config);

        assert_eq!(
            human(&guard, "G9", "U1").await.0,
            Decision::Ignored(IgnoreReason::GroupNotAllowed)
        );
        // U1 at 1, effective max 0, bot 0: suppressed.
        assert!(human(&guard, "G1", "U1").await.0.is_suppressed());
        guard.store().close().await;
    }
}
