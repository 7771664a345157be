//! PledgeApi - 外部から呼ばれる境界
//!
//! # 書き込み（createOrUpdatePledge）
//! 1. 呼び出し元 identity の確認（なければ Unauthorized）
//! 2. 入力の検証（taskId / amount、ストアに触る前に InvalidInput）
//! 3. PledgeStore::upsert_pledge()（アトミック、一時エラーはリトライ）
//! 4. TaskStatusSync::resync()（同じリクエスト内で同期的に）
//!
//! 3 が成功して 4 が失敗した場合、pledge は失われません。task は
//! 3 で進んだ ledger revision と一緒に deferred resync に登録され、次の
//! 読み込み（read-repair）か `flush_deferred_resyncs()` で追いつきます。
//! 登録が消えるのはキャッシュがその revision 以上になったときだけです
//! （並行する古い resync の成功では消えない）。
//!
//! # 読み込み
//! - `list_pledges_for_task`: pledge 行 + プロフィール（なければ "Anonymous"）
//! - `top_contributors`: 金額上位 N 人
//! - `task_funding` / `list_task_fundings`: ledger から計算した資金状況

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::config::ListingSettings;
use crate::domain::aggregate;
use crate::domain::{
    Amount, CommittedPledge, LedgerSnapshot, Pledge, PledgeError, PledgeQuery, Profile,
    StoreError, Task, TaskId, TaskStatus, UserId,
};
use crate::ports::{Clock, IdGenerator, PledgeStore, ProfileDirectory, TaskStore};

use super::retry::RetryPolicy;
use super::sync::TaskStatusSync;
use super::wire::{ListPledgesParams, PledgeRequest};

/// A pledge joined with the contributor's public profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributorPledge {
    pub pledge: Pledge,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// One entry of a top-contributors ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedContributor {
    pub user_id: UserId,
    pub amount: Amount,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Funding figures of one task, computed from its ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFunding {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub pledged_amount: Decimal,
    pub goal_amount: Decimal,
    pub contributor_count: u64,
    pub funding_percentage: Decimal,
}

/// PledgeApi は pledge の書き込みと読み込みの入口
///
/// Clone は同じストアと deferred resync を共有します。
#[derive(Clone)]
pub struct PledgeApi {
    tasks: Arc<dyn TaskStore>,
    pledges: Arc<dyn PledgeStore>,
    profiles: Arc<dyn ProfileDirectory>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    sync: TaskStatusSync,
    retry: RetryPolicy,
    listing: ListingSettings,
    /// task ごとに、キャッシュが追いつくべき ledger revision
    deferred: Arc<Mutex<HashMap<TaskId, u64>>>,
}

impl PledgeApi {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        pledges: Arc<dyn PledgeStore>,
        profiles: Arc<dyn ProfileDirectory>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        retry: RetryPolicy,
        listing: ListingSettings,
    ) -> Self {
        let sync = TaskStatusSync::new(
            Arc::clone(&tasks),
            Arc::clone(&pledges),
            Arc::clone(&clock),
            retry.clone(),
        );
        Self {
            tasks,
            pledges,
            profiles,
            clock,
            ids,
            sync,
            retry,
            listing,
            deferred: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a task with the given funding goal.
    #[tracing::instrument(skip_all, fields(goal_amount = %goal_amount))]
    pub async fn register_task(&self, goal_amount: Decimal) -> Result<Task, PledgeError> {
        let task = Task::new(self.ids.generate_task_id(), goal_amount, self.clock.now())?;
        let task = self
            .retry
            .run("create_task", || self.tasks.create_task(task.clone()))
            .await?;
        tracing::info!(task_id = %task.id, "task registered");
        Ok(task)
    }

    /// `POST pledge`
    ///
    /// `caller` は identity provider が確立した user id。`None` や空文字は
    /// 入力の検証より先に Unauthorized になります。
    pub async fn create_or_update_pledge(
        &self,
        caller: Option<&str>,
        request: &PledgeRequest,
    ) -> Result<Pledge, PledgeError> {
        let user_id = caller.and_then(UserId::parse).ok_or_else(|| {
            PledgeError::Unauthorized("a valid caller identity is required".to_string())
        })?;
        let (task_id, amount) = request.parse()?;
        self.pledge(user_id, task_id, amount).await
    }

    /// Typed form of `create_or_update_pledge` for already-validated input.
    #[tracing::instrument(skip_all, fields(task_id = %task_id, user_id = %user_id))]
    pub async fn pledge(
        &self,
        user_id: UserId,
        task_id: TaskId,
        amount: Amount,
    ) -> Result<Pledge, PledgeError> {
        // 挿入にならなかった場合 new_id は捨てられる
        let new_id = self.ids.generate_pledge_id();
        let now = self.clock.now();

        let CommittedPledge {
            pledge,
            ledger_revision,
        } = self
            .retry
            .run("upsert_pledge", || {
                self.pledges
                    .upsert_pledge(new_id, task_id, user_id.clone(), amount, now)
            })
            .await?;

        match self.sync.resync(task_id).await {
            Ok(task) => {
                self.settle(task_id, task.aggregates.ledger_revision).await;
                tracing::info!(
                    pledge_id = %pledge.id,
                    amount = %pledge.amount,
                    pledged_amount = %task.aggregates.pledged_amount,
                    contributor_count = task.aggregates.contributor_count,
                    "pledge recorded"
                );
            }
            Err(err) => {
                self.deferred
                    .lock()
                    .await
                    .entry(task_id)
                    .and_modify(|needed| *needed = (*needed).max(ledger_revision))
                    .or_insert(ledger_revision);
                tracing::error!(
                    pledge_id = %pledge.id,
                    ledger_revision,
                    error = %err,
                    "pledge committed but resync failed, deferred"
                );
            }
        }
        Ok(pledge)
    }

    /// `GET pledges`
    pub async fn list_pledges_for_task(
        &self,
        params: &ListPledgesParams,
    ) -> Result<Vec<ContributorPledge>, PledgeError> {
        let (task_id, query) = params.parse()?;
        self.list_pledges(task_id, query).await
    }

    #[tracing::instrument(skip_all, fields(task_id = %task_id))]
    pub async fn list_pledges(
        &self,
        task_id: TaskId,
        query: PledgeQuery,
    ) -> Result<Vec<ContributorPledge>, PledgeError> {
        let pledges = self
            .retry
            .run("list_pledges", || self.pledges.list_pledges(task_id, query))
            .await?;

        let profiles = self
            .lookup_profiles(pledges.iter().map(|p| &p.user_id))
            .await;

        Ok(pledges
            .into_iter()
            .map(|pledge| {
                let (display_name, avatar_url) = self.presentation(&profiles, &pledge.user_id);
                ContributorPledge {
                    pledge,
                    display_name,
                    avatar_url,
                }
            })
            .collect())
    }

    /// Highest contributors of a task. `n` defaults to the configured strip size.
    #[tracing::instrument(skip_all, fields(task_id = %task_id))]
    pub async fn top_contributors(
        &self,
        task_id: TaskId,
        n: Option<usize>,
    ) -> Result<Vec<RankedContributor>, PledgeError> {
        let snapshot = self.snapshot(task_id).await?;
        let ranking =
            aggregate::top_contributors(&snapshot.pledges, n.unwrap_or(self.listing.top_contributors));

        let profiles = self.lookup_profiles(ranking.iter().map(|c| &c.user_id)).await;

        Ok(ranking
            .into_iter()
            .map(|c| {
                let (display_name, avatar_url) = self.presentation(&profiles, &c.user_id);
                RankedContributor {
                    user_id: c.user_id,
                    amount: c.amount,
                    display_name,
                    avatar_url,
                }
            })
            .collect())
    }

    /// Funding figures of one task, read-repairing the cached aggregates.
    #[tracing::instrument(skip_all, fields(task_id = %task_id))]
    pub async fn task_funding(&self, task_id: TaskId) -> Result<TaskFunding, PledgeError> {
        let task = self
            .retry
            .run("get_task", || self.tasks.get_task(task_id))
            .await?
            .ok_or(StoreError::TaskNotFound(task_id))?;
        let snapshot = self.snapshot(task_id).await?;
        Ok(self.funding_of(task, &snapshot).await)
    }

    /// Funding figures of every task, oldest first.
    pub async fn list_task_fundings(&self) -> Result<Vec<TaskFunding>, PledgeError> {
        let tasks = self
            .retry
            .run("list_tasks", || self.tasks.list_tasks())
            .await?;

        let mut fundings = Vec::with_capacity(tasks.len());
        for task in tasks {
            let snapshot = self.snapshot(task.id).await?;
            fundings.push(self.funding_of(task, &snapshot).await);
        }
        Ok(fundings)
    }

    /// Retry every deferred resync. Returns how many were repaired.
    pub async fn flush_deferred_resyncs(&self) -> usize {
        let pending: Vec<TaskId> = self.deferred.lock().await.keys().copied().collect();

        let mut repaired = 0;
        for task_id in pending {
            match self.sync.resync(task_id).await {
                Ok(task) => {
                    if self.settle(task_id, task.aggregates.ledger_revision).await {
                        repaired += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(%task_id, error = %err, "deferred resync still failing");
                }
            }
        }
        repaired
    }

    /// Tasks whose cached aggregates are known to lag the ledger.
    pub async fn deferred_resyncs(&self) -> Vec<TaskId> {
        let mut pending: Vec<TaskId> = self.deferred.lock().await.keys().copied().collect();
        pending.sort();
        pending
    }

    /// キャッシュが `applied` まで進んだことを記録する。
    ///
    /// deferred の revision に届いていれば登録を外して `true`。届いていない
    /// （古いスナップショットの resync だった）なら登録を残して `false`。
    async fn settle(&self, task_id: TaskId, applied: u64) -> bool {
        let mut deferred = self.deferred.lock().await;
        match deferred.get(&task_id) {
            Some(&needed) if applied < needed => {
                tracing::debug!(%task_id, applied, needed, "resync behind deferred revision, kept");
                false
            }
            Some(_) => {
                deferred.remove(&task_id);
                true
            }
            None => true,
        }
    }

    async fn snapshot(&self, task_id: TaskId) -> Result<LedgerSnapshot, StoreError> {
        self.retry
            .run("ledger_snapshot", || self.pledges.ledger_snapshot(task_id))
            .await
    }

    async fn funding_of(&self, task: Task, snapshot: &LedgerSnapshot) -> TaskFunding {
        let live = aggregate::summarize(snapshot);

        let pending = self.deferred.lock().await.contains_key(&task.id);
        if pending || !task.aggregates.same_figures(&live) {
            match self.sync.resync_from(task.id, snapshot).await {
                Ok(repaired) => {
                    self.settle(task.id, repaired.aggregates.ledger_revision).await;
                    tracing::info!(task_id = %task.id, revision = snapshot.revision, "read-repaired task aggregates");
                }
                Err(err) => {
                    tracing::warn!(task_id = %task.id, error = %err, "read-repair failed");
                }
            }
        }

        let goal_amount = task.goal_amount.value();
        TaskFunding {
            task_id: task.id,
            status: task.status,
            pledged_amount: live.pledged_amount,
            goal_amount,
            contributor_count: live.contributor_count,
            funding_percentage: aggregate::funding_percentage(live.pledged_amount, goal_amount),
        }
    }

    /// プロフィール参照の失敗はリスト全体を失敗させない
    async fn lookup_profiles<'a>(
        &self,
        user_ids: impl Iterator<Item = &'a UserId>,
    ) -> HashMap<UserId, Profile> {
        let mut seen = HashSet::new();
        let unique: Vec<UserId> = user_ids
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();
        if unique.is_empty() {
            return HashMap::new();
        }

        match self.profiles.lookup_profiles(&unique).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(users = unique.len(), error = %err, "profile lookup failed, using fallback names");
                HashMap::new()
            }
        }
    }

    fn presentation(
        &self,
        profiles: &HashMap<UserId, Profile>,
        user_id: &UserId,
    ) -> (String, Option<String>) {
        match profiles.get(user_id) {
            Some(profile) => (
                profile
                    .display_name_or(&self.listing.anonymous_name)
                    .to_string(),
                profile.avatar_url.clone(),
            ),
            None => (self.listing.anonymous_name.clone(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, ProfileError, SortBy, SortOrder, TaskAggregates};
    use crate::impls::{InMemoryLedger, InMemoryProfileDirectory};
    use crate::ports::{FixedClock, UlidGenerator};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::oneshot;

    /// 次の apply_aggregates を止めておく仕掛け
    struct ApplyGate {
        arrived: oneshot::Sender<()>,
        release: oneshot::Receiver<()>,
    }

    /// InMemoryLedger に一時エラーを注入するラッパー
    #[derive(Default)]
    struct FlakyLedger {
        inner: InMemoryLedger,
        failing_upserts: AtomicU32,
        failing_applies: AtomicU32,
        upsert_error: Option<StoreError>,
        gate: std::sync::Mutex<Option<ApplyGate>>,
    }

    impl FlakyLedger {
        fn trip(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }

        /// 次の apply_aggregates をスナップショット計算後で止める。
        /// 1 つ目は止まったことの通知、2 つ目を送ると再開する。
        fn hold_next_apply(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (arrived_tx, arrived_rx) = oneshot::channel();
            let (release_tx, release_rx) = oneshot::channel();
            *self.gate.lock().unwrap() = Some(ApplyGate {
                arrived: arrived_tx,
                release: release_rx,
            });
            (arrived_rx, release_tx)
        }
    }

    #[async_trait]
    impl TaskStore for FlakyLedger {
        async fn create_task(&self, task: Task) -> Result<Task, StoreError> {
            self.inner.create_task(task).await
        }

        async fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, StoreError> {
            self.inner.get_task(task_id).await
        }

        async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
            self.inner.list_tasks().await
        }

        async fn apply_aggregates(
            &self,
            task_id: TaskId,
            aggregates: TaskAggregates,
            now: DateTime<Utc>,
        ) -> Result<Task, StoreError> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.arrived.send(());
                let _ = gate.release.await;
            }
            if Self::trip(&self.failing_applies) {
                return Err(StoreError::Unavailable("task store offline".into()));
            }
            self.inner.apply_aggregates(task_id, aggregates, now).await
        }
    }

    #[async_trait]
    impl PledgeStore for FlakyLedger {
        async fn upsert_pledge(
            &self,
            new_id: crate::domain::PledgeId,
            task_id: TaskId,
            user_id: UserId,
            amount: Amount,
            now: DateTime<Utc>,
        ) -> Result<CommittedPledge, StoreError> {
            if Self::trip(&self.failing_upserts) {
                return Err(self
                    .upsert_error
                    .clone()
                    .unwrap_or_else(|| StoreError::Conflict("unique constraint race".into())));
            }
            self.inner
                .upsert_pledge(new_id, task_id, user_id, amount, now)
                .await
        }

        async fn get_pledge(
            &self,
            task_id: TaskId,
            user_id: &UserId,
        ) -> Result<Option<Pledge>, StoreError> {
            self.inner.get_pledge(task_id, user_id).await
        }

        async fn list_pledges(
            &self,
            task_id: TaskId,
            query: PledgeQuery,
        ) -> Result<Vec<Pledge>, StoreError> {
            self.inner.list_pledges(task_id, query).await
        }

        async fn ledger_snapshot(&self, task_id: TaskId) -> Result<LedgerSnapshot, StoreError> {
            self.inner.ledger_snapshot(task_id).await
        }
    }

    struct OfflineProfiles;

    #[async_trait]
    impl ProfileDirectory for OfflineProfiles {
        async fn lookup_profiles(
            &self,
            _user_ids: &[UserId],
        ) -> Result<HashMap<UserId, Profile>, ProfileError> {
            Err(ProfileError::Unavailable("directory timeout".into()))
        }
    }

    struct Harness {
        api: PledgeApi,
        ledger: Arc<FlakyLedger>,
        profiles: InMemoryProfileDirectory,
        clock: Arc<FixedClock>,
    }

    fn harness_with(ledger: FlakyLedger, profiles: Option<Arc<dyn ProfileDirectory>>) -> Harness {
        let ledger = Arc::new(ledger);
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        let directory = InMemoryProfileDirectory::new();
        let api = PledgeApi::new(
            ledger.clone(),
            ledger.clone(),
            profiles.unwrap_or_else(|| Arc::new(directory.clone()) as Arc<dyn ProfileDirectory>),
            clock.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            RetryPolicy::immediate(3),
            ListingSettings::default(),
        );
        Harness {
            api,
            ledger,
            profiles: directory,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(FlakyLedger::default(), None)
    }

    impl Harness {
        async fn pledge(&self, user: &str, task_id: TaskId, amount: serde_json::Value) -> Result<Pledge, PledgeError> {
            self.clock.advance(Duration::seconds(1));
            self.api
                .create_or_update_pledge(Some(user), &PledgeRequest::new(task_id, amount))
                .await
        }

        async fn cached(&self, task_id: TaskId) -> TaskAggregates {
            self.ledger
                .inner
                .get_task(task_id)
                .await
                .unwrap()
                .unwrap()
                .aggregates
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn funding_follows_create_then_update() {
        let h = harness();
        let task = h.api.register_task(Decimal::from(200)).await.unwrap();

        h.pledge("user1", task.id, 50.into()).await.unwrap();
        let funding = h.api.task_funding(task.id).await.unwrap();
        assert_eq!(funding.pledged_amount, dec("50"));
        assert_eq!(funding.contributor_count, 1);
        assert_eq!(funding.funding_percentage, dec("25"));

        h.pledge("user2", task.id, 75.into()).await.unwrap();
        let funding = h.api.task_funding(task.id).await.unwrap();
        assert_eq!(funding.pledged_amount, dec("125"));
        assert_eq!(funding.contributor_count, 2);
        assert_eq!(funding.funding_percentage, dec("62.5"));

        h.pledge("user1", task.id, 100.into()).await.unwrap();
        let funding = h.api.task_funding(task.id).await.unwrap();
        assert_eq!(funding.pledged_amount, dec("175"));
        assert_eq!(funding.contributor_count, 2);
        assert_eq!(funding.funding_percentage, dec("87.5"));
        assert_eq!(funding.goal_amount, dec("200"));

        // キャッシュも同じリクエスト内で追いついている
        let cached = h.cached(task.id).await;
        assert_eq!(cached.pledged_amount, dec("175"));
        assert_eq!(cached.contributor_count, 2);
        assert_eq!(h.ledger.inner.pledge_count().await, 2);
    }

    #[tokio::test]
    async fn update_keeps_pledge_identity() {
        let h = harness();
        let task = h.api.register_task(Decimal::from(200)).await.unwrap();

        let first = h.pledge("user1", task.id, 50.into()).await.unwrap();
        let second = h.pledge("user1", task.id, "80".into()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.amount.value(), dec("80"));
    }

    #[tokio::test]
    async fn missing_caller_is_unauthorized_before_validation() {
        let h = harness();
        let err = h
            .api
            .create_or_update_pledge(None, &PledgeRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = h
            .api
            .create_or_update_pledge(Some("   "), &PledgeRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected_without_touching_the_ledger() {
        let h = harness();
        let task = h.api.register_task(Decimal::from(200)).await.unwrap();

        let err = h.pledge("user1", task.id, 0.into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(h.ledger.inner.pledge_count().await, 0);
        assert_eq!(h.cached(task.id).await, TaskAggregates::default());
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let h = harness();
        let missing = h.api.ids.generate_task_id();

        let err = h.pledge("user1", missing, 10.into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = h.api.task_funding(missing).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = h
            .api
            .list_pledges_for_task(&ListPledgesParams::for_task(missing))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn non_positive_goal_is_invalid_input() {
        let h = harness();
        let err = h.api.register_task(Decimal::ZERO).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn listing_joins_profiles_with_fallback() {
        let h = harness();
        let task = h.api.register_task(Decimal::from(500)).await.unwrap();
        h.profiles
            .put(Profile::new(UserId::parse("user1").unwrap(), "Ada").with_avatar("https://img/ada.png"))
            .await;

        h.pledge("user1", task.id, 100.into()).await.unwrap();
        h.pledge("user2", task.id, 75.into()).await.unwrap();
        h.pledge("user3", task.id, 30.into()).await.unwrap();

        let params = ListPledgesParams::for_task(task.id)
            .sorted(SortBy::Amount, SortOrder::Desc)
            .limit(2);
        let rows = h.api.list_pledges_for_task(&params).await.unwrap();

        let summary: Vec<(&str, Decimal, &str)> = rows
            .iter()
            .map(|r| {
                (
                    r.pledge.user_id.as_str(),
                    r.pledge.amount.value(),
                    r.display_name.as_str(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![("user1", dec("100"), "Ada"), ("user2", dec("75"), "Anonymous")]
        );
        assert_eq!(rows[0].avatar_url.as_deref(), Some("https://img/ada.png"));
        assert_eq!(rows[1].avatar_url, None);
    }

    #[tokio::test]
    async fn listing_survives_profile_outage() {
        let h = harness_with(FlakyLedger::default(), Some(Arc::new(OfflineProfiles)));
        let task = h.api.register_task(Decimal::from(100)).await.unwrap();
        h.pledge("user1", task.id, 10.into()).await.unwrap();

        let rows = h
            .api
            .list_pledges(task.id, PledgeQuery::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].display_name, "Anonymous");

        let top = h.api.top_contributors(task.id, None).await.unwrap();
        assert_eq!(top[0].display_name, "Anonymous");
    }

    #[tokio::test]
    async fn top_contributors_defaults_to_three() {
        let h = harness();
        let task = h.api.register_task(Decimal::from(1000)).await.unwrap();
        for (user, amount) in [("a", 10), ("b", 40), ("c", 30), ("d", 20)] {
            h.pledge(user, task.id, amount.into()).await.unwrap();
        }

        let top = h.api.top_contributors(task.id, None).await.unwrap();
        let users: Vec<&str> = top.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(users, vec!["b", "c", "d"]);

        let top = h.api.top_contributors(task.id, Some(1)).await.unwrap();
        assert_eq!(top.len(), 1);
    }

    #[tokio::test]
    async fn transient_upsert_conflicts_are_retried() {
        let ledger = FlakyLedger::default();
        ledger.failing_upserts.store(2, Ordering::SeqCst);
        let h = harness_with(ledger, None);
        let task = h.api.register_task(Decimal::from(100)).await.unwrap();

        h.pledge("user1", task.id, 10.into()).await.unwrap();
        assert_eq!(h.ledger.inner.pledge_count().await, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_kind_and_leave_state_unchanged() {
        let ledger = FlakyLedger::default();
        ledger.failing_upserts.store(10, Ordering::SeqCst);
        let h = harness_with(ledger, None);
        let task = h.api.register_task(Decimal::from(100)).await.unwrap();

        let err = h.pledge("user1", task.id, 10.into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictRetryable);
        assert_eq!(h.ledger.inner.pledge_count().await, 0);
        assert_eq!(h.cached(task.id).await, TaskAggregates::default());

        let ledger = FlakyLedger {
            upsert_error: Some(StoreError::Unavailable("connection refused".into())),
            ..FlakyLedger::default()
        };
        ledger.failing_upserts.store(10, Ordering::SeqCst);
        let h = harness_with(ledger, None);
        let task = h.api.register_task(Decimal::from(100)).await.unwrap();

        let err = h.pledge("user1", task.id, 10.into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn failed_resync_is_deferred_then_read_repaired() {
        let h = harness();
        let task = h.api.register_task(Decimal::from(200)).await.unwrap();
        h.ledger.failing_applies.store(3, Ordering::SeqCst);

        // pledge 自体は成功する
        let pledge = h.pledge("user1", task.id, 50.into()).await.unwrap();
        assert_eq!(pledge.amount.value(), dec("50"));
        assert_eq!(h.api.deferred_resyncs().await, vec![task.id]);
        assert_eq!(h.cached(task.id).await.pledged_amount, Decimal::ZERO);

        let funding = h.api.task_funding(task.id).await.unwrap();
        assert_eq!(funding.pledged_amount, dec("50"));
        assert!(h.api.deferred_resyncs().await.is_empty());
        assert_eq!(h.cached(task.id).await.pledged_amount, dec("50"));
    }

    #[tokio::test]
    async fn flush_repairs_deferred_tasks() {
        let h = harness();
        let task = h.api.register_task(Decimal::from(200)).await.unwrap();
        h.ledger.failing_applies.store(3, Ordering::SeqCst);
        h.pledge("user1", task.id, 60.into()).await.unwrap();

        assert_eq!(h.api.flush_deferred_resyncs().await, 1);
        assert!(h.api.deferred_resyncs().await.is_empty());
        assert_eq!(h.cached(task.id).await.contributor_count, 1);
    }

    #[tokio::test]
    async fn stale_resync_does_not_clear_newer_deferral() {
        let h = harness();
        let task_id = h.api.register_task(Decimal::from(200)).await.unwrap().id;

        // user2 の resync は revision 1 のスナップショットを持ったまま止まる
        let (arrived, release) = h.ledger.hold_next_apply();
        let api = h.api.clone();
        let slow = tokio::spawn(async move {
            api.create_or_update_pledge(Some("user2"), &PledgeRequest::new(task_id, 50))
                .await
        });
        arrived.await.unwrap();

        // user1 は revision 2 を commit するが resync は全部失敗する
        h.ledger.failing_applies.store(3, Ordering::SeqCst);
        h.pledge("user1", task_id, 75.into()).await.unwrap();
        assert_eq!(h.api.deferred_resyncs().await, vec![task_id]);

        release.send(()).unwrap();
        slow.await.unwrap().unwrap();

        // revision 1 の適用では revision 2 の deferral は消えない
        assert_eq!(h.api.deferred_resyncs().await, vec![task_id]);
        let cached = h.cached(task_id).await;
        assert_eq!(cached.pledged_amount, dec("50"));
        assert_eq!(cached.ledger_revision, 1);

        assert_eq!(h.api.flush_deferred_resyncs().await, 1);
        assert!(h.api.deferred_resyncs().await.is_empty());
        let cached = h.cached(task_id).await;
        assert_eq!(cached.pledged_amount, dec("125"));
        assert_eq!(cached.contributor_count, 2);
        assert_eq!(cached.ledger_revision, 2);
    }

    #[tokio::test]
    async fn overlapping_resyncs_keep_newest_aggregates() {
        let h = harness();
        let task_id = h.api.register_task(Decimal::from(200)).await.unwrap().id;

        let (arrived, release) = h.ledger.hold_next_apply();
        let api = h.api.clone();
        let slow = tokio::spawn(async move {
            api.create_or_update_pledge(Some("user2"), &PledgeRequest::new(task_id, 50))
                .await
        });
        arrived.await.unwrap();

        // 後から来た pledge が先に revision 2 を書く
        h.pledge("user1", task_id, 75.into()).await.unwrap();
        let cached = h.cached(task_id).await;
        assert_eq!(cached.pledged_amount, dec("125"));
        assert_eq!(cached.ledger_revision, 2);

        release.send(()).unwrap();
        let pledge = slow.await.unwrap().unwrap();
        assert_eq!(pledge.amount.value(), dec("50"));

        // 止まっていた revision 1 の書き戻しは捨てられる
        let cached = h.cached(task_id).await;
        assert_eq!(cached.pledged_amount, dec("125"));
        assert_eq!(cached.contributor_count, 2);
        assert_eq!(cached.ledger_revision, 2);
        assert!(h.api.deferred_resyncs().await.is_empty());
        assert_eq!(h.api.task_funding(task_id).await.unwrap().pledged_amount, dec("125"));
    }

    #[tokio::test]
    async fn list_task_fundings_covers_every_task() {
        let h = harness();
        let first = h.api.register_task(Decimal::from(100)).await.unwrap();
        h.clock.advance(Duration::seconds(1));
        let second = h.api.register_task(Decimal::from(50)).await.unwrap();
        h.pledge("user1", second.id, 25.into()).await.unwrap();

        let fundings = h.api.list_task_fundings().await.unwrap();
        assert_eq!(fundings.len(), 2);
        assert_eq!(fundings[0].task_id, first.id);
        assert_eq!(fundings[0].funding_percentage, Decimal::ZERO);
        assert_eq!(fundings[1].task_id, second.id);
        assert_eq!(fundings[1].funding_percentage, dec("50"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pledges_converge() {
        let h = harness();
        let task_id = h.api.register_task(Decimal::from(10_000)).await.unwrap().id;

        let mut handles = Vec::new();
        for i in 1..=16u32 {
            let api = h.api.clone();
            handles.push(tokio::spawn(async move {
                let request = PledgeRequest::new(task_id, i);
                api.create_or_update_pledge(Some(&format!("user{i}")), &request)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let expected: Decimal = (1..=16).map(Decimal::from).sum();
        let cached = h.cached(task_id).await;
        assert_eq!(cached.pledged_amount, expected);
        assert_eq!(cached.contributor_count, 16);
        assert_eq!(cached.ledger_revision, 16);

        let funding = h.api.task_funding(task_id).await.unwrap();
        assert_eq!(funding.pledged_amount, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_user_leaves_one_row() {
        let h = harness();
        let task_id = h.api.register_task(Decimal::from(10_000)).await.unwrap().id;

        let mut handles = Vec::new();
        for i in 1..=8u32 {
            let api = h.api.clone();
            handles.push(tokio::spawn(async move {
                api.create_or_update_pledge(Some("same-user"), &PledgeRequest::new(task_id, i))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(h.ledger.inner.pledge_count().await, 1);
        let cached = h.cached(task_id).await;
        assert_eq!(cached.contributor_count, 1);
        let row = h
            .ledger
            .inner
            .get_pledge(task_id, &UserId::parse("same-user").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.pledged_amount, row.amount.value());
    }
}
