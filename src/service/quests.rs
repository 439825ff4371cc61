//! Quest lifecycle: definition, acceptance, submission and review.

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use super::LedgerService;
use super::ledger::post;
use crate::domain::{
    Actor, LedgerMutation, LedgerRecord, Quest, QuestId, QuestParticipation, QuestStatus,
    TransactionEntry, TransactionKind, UserId,
};
use crate::error::LedgerError;
use crate::persistence::DocumentStore;

/// Input for [`LedgerService::create_quest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuest {
    /// Display title.
    pub title: String,
    /// Points credited on approval.
    pub reward: i64,
    /// Optional capacity.
    pub max_participants: Option<u32>,
}

/// Result of an approved quest submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuestApproval {
    /// Participation, now `completed`.
    pub participation: QuestParticipation,
    /// Participant's ledger after the reward.
    pub ledger: LedgerRecord,
    /// The `quest_reward` log entry.
    pub entry: TransactionEntry,
}

impl<S: DocumentStore> LedgerService<S> {
    /// Defines a new open quest.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admins and
    /// [`LedgerError::Validation`] for a blank title, a non-positive reward
    /// or a zero capacity.
    pub async fn create_quest(&self, actor: &Actor, input: NewQuest) -> Result<Quest, LedgerError> {
        actor.require_admin()?;
        if input.title.trim().is_empty() {
            return Err(LedgerError::Validation("quest title is empty".to_string()));
        }
        if input.reward <= 0 {
            return Err(LedgerError::Validation(format!(
                "quest reward must be positive, got {}",
                input.reward
            )));
        }
        if input.max_participants == Some(0) {
            return Err(LedgerError::Validation(
                "max_participants must be positive".to_string(),
            ));
        }

        let quest = Quest {
            id: QuestId::new(),
            title: input.title,
            reward: input.reward,
            status: QuestStatus::Open,
            participant_count: 0,
            max_participants: input.max_participants,
            created_by: actor.id,
            created_at: Utc::now(),
        };
        let key = Quest::key(quest.id);
        self.transact("create_quest", std::slice::from_ref(&key), |txn| {
            txn.insert(&key, &quest)
        })
        .await?;

        tracing::info!(quest_id = %quest.id, reward = quest.reward, "quest created");
        Ok(quest)
    }

    /// Stops a quest from taking new participants. Existing
    /// participations can still be submitted and reviewed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admins and
    /// [`LedgerError::NotFound`] for an unknown quest.
    pub async fn close_quest(&self, actor: &Actor, quest_id: QuestId) -> Result<Quest, LedgerError> {
        actor.require_admin()?;
        let key = Quest::key(quest_id);
        let quest = self
            .transact("close_quest", std::slice::from_ref(&key), |txn| {
                let mut quest: Quest =
                    txn.require(&key, || LedgerError::NotFound(format!("quest {quest_id}")))?;
                if quest.status != QuestStatus::Closed {
                    quest.status = QuestStatus::Closed;
                    txn.put(&key, &quest)?;
                }
                Ok(quest)
            })
            .await?;

        tracing::info!(%quest_id, "quest closed");
        Ok(quest)
    }

    /// Accepts a quest for the caller, fixing its reward.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown quest or a caller
    /// without a ledger, [`LedgerError::QuestClosed`] if it is closed or
    /// full, and
    /// [`LedgerError::AlreadyAccepted`] if the caller already has a
    /// participation in any status.
    pub async fn accept_quest(
        &self,
        actor: &Actor,
        quest_id: QuestId,
    ) -> Result<QuestParticipation, LedgerError> {
        let user_id = actor.id;
        let quest_key = Quest::key(quest_id);
        let part_key = QuestParticipation::key(user_id, quest_id);
        let ledger_key = LedgerRecord::key(user_id);
        let keys = [quest_key.clone(), part_key.clone(), ledger_key.clone()];

        let participation = self
            .transact("accept_quest", &keys, |txn| {
                let mut quest: Quest = txn.require(&quest_key, || {
                    LedgerError::NotFound(format!("quest {quest_id}"))
                })?;
                if txn.get::<QuestParticipation>(&part_key)?.is_some() {
                    return Err(LedgerError::AlreadyAccepted);
                }
                txn.require::<LedgerRecord>(&ledger_key, || {
                    LedgerError::NotFound(format!("ledger {user_id}"))
                })?;
                quest.admit()?;
                let participation = QuestParticipation::accept(user_id, &quest, Utc::now());
                txn.put(&quest_key, &quest)?;
                txn.put(&part_key, &participation)?;
                Ok(participation)
            })
            .await?;

        tracing::info!(%user_id, %quest_id, "quest accepted");
        Ok(participation)
    }

    /// Submits the caller's report for an accepted quest.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] without a participation,
    /// [`LedgerError::Validation`] for a blank report, and
    /// [`LedgerError::InvalidState`] unless the participation is
    /// `accepted`.
    pub async fn submit_quest(
        &self,
        actor: &Actor,
        quest_id: QuestId,
        report: String,
    ) -> Result<QuestParticipation, LedgerError> {
        if report.trim().is_empty() {
            return Err(LedgerError::Validation("report text is empty".to_string()));
        }
        let user_id = actor.id;
        let key = QuestParticipation::key(user_id, quest_id);

        let participation = self
            .transact("submit_quest", std::slice::from_ref(&key), |txn| {
                let mut participation: QuestParticipation = txn.require(&key, || {
                    LedgerError::NotFound(format!("participation {user_id}:{quest_id}"))
                })?;
                participation.submit(report.clone(), Utc::now())?;
                txn.put(&key, &participation)?;
                Ok(participation)
            })
            .await?;

        tracing::info!(%user_id, %quest_id, "quest submitted");
        Ok(participation)
    }

    /// Approves a submitted quest and credits its reward in the same
    /// commit.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admins,
    /// [`LedgerError::NotFound`] without a participation, and
    /// [`LedgerError::NotAwaitingApproval`] unless it is `submitted`.
    pub async fn approve_quest(
        &self,
        actor: &Actor,
        user_id: UserId,
        quest_id: QuestId,
    ) -> Result<QuestApproval, LedgerError> {
        actor.require_admin()?;
        let part_key = QuestParticipation::key(user_id, quest_id);
        let keys = [part_key.clone(), LedgerRecord::key(user_id)];

        let approval = self
            .transact("approve_quest", &keys, |txn| {
                let now = Utc::now();
                let mut participation: QuestParticipation = txn.require(&part_key, || {
                    LedgerError::NotFound(format!("participation {user_id}:{quest_id}"))
                })?;
                participation.review(true, actor.id, now)?;
                let mutation = LedgerMutation::spendable(
                    participation.reward,
                    TransactionKind::QuestReward,
                    format!("quest {quest_id} completed"),
                    actor.id,
                )
                .with_reference(quest_id);
                let posting = post(txn, user_id, &mutation, now)?;
                txn.put(&part_key, &participation)?;
                Ok(QuestApproval {
                    participation,
                    ledger: posting.ledger,
                    entry: posting.entry,
                })
            })
            .await?;

        tracing::info!(
            %user_id,
            %quest_id,
            reward = approval.entry.amount,
            "quest approved"
        );
        Ok(approval)
    }

    /// Rejects a submitted quest. No ledger effect; the participation is
    /// terminal afterwards.
    ///
    /// # Errors
    ///
    /// Same as [`LedgerService::approve_quest`].
    pub async fn reject_quest(
        &self,
        actor: &Actor,
        user_id: UserId,
        quest_id: QuestId,
    ) -> Result<QuestParticipation, LedgerError> {
        actor.require_admin()?;
        let key = QuestParticipation::key(user_id, quest_id);

        let participation = self
            .transact("reject_quest", std::slice::from_ref(&key), |txn| {
                let mut participation: QuestParticipation = txn.require(&key, || {
                    LedgerError::NotFound(format!("participation {user_id}:{quest_id}"))
                })?;
                participation.review(false, actor.id, Utc::now())?;
                txn.put(&key, &participation)?;
                Ok(participation)
            })
            .await?;

        tracing::info!(%user_id, %quest_id, "quest rejected");
        Ok(participation)
    }

    /// Returns a quest.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if it does not exist.
    pub async fn quest(&self, quest_id: QuestId) -> Result<Quest, LedgerError> {
        self.load(Quest::key(quest_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("quest {quest_id}")))
    }

    /// Returns the participation of `user_id` in `quest_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if it does not exist.
    pub async fn participation(
        &self,
        user_id: UserId,
        quest_id: QuestId,
    ) -> Result<QuestParticipation, LedgerError> {
        self.load(QuestParticipation::key(user_id, quest_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("participation {user_id}:{quest_id}")))
    }
}
