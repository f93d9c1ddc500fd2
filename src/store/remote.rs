//! Remote real-time document store on PostgreSQL.
//!
//! Documents are JSONB rows; every write notifies `northpole_changes` inside
//! its transaction and subscribers re-read the collection on each notice.

use async_std::task::{self, JoinHandle};
use log::*;
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions, Postgres};
use sqlx::types::Json;
use sqlx::Transaction;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::Reporter;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{Entity, Kind, PollOption, PollVote};
use crate::schema;

/**
 * Payload announcing a change to `kind` within `project`
 */
pub(crate) fn topic(project: &str, kind: Kind) -> String {
    format!("{}/{}", project, kind.collection())
}

/**
 * Advisory lock name guarding one participant's vote in one poll
 */
pub(crate) fn vote_lock(project: &str, vote_id: &str) -> String {
    format!("{}/{}", topic(project, Kind::PollVotes), vote_id)
}

/**
 * Poll options keep their stored counter when replaced
 */
pub(crate) fn upsert_for(kind: Kind) -> &'static str {
    match kind {
        Kind::PollOptions => schema::UPSERT_KEEPING_VOTES,
        _ => schema::UPSERT,
    }
}

pub struct RemoteStore {
    pool: PgPool,
    project: String,
    online: AtomicBool,
}

impl RemoteStore {
    /**
     * Create the connection pool without touching the network, so an
     * unreachable server only shows up as "offline"
     */
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&config.database_url)?;

        Ok(Self {
            pool,
            project: config.project_id.clone(),
            online: AtomicBool::new(false),
        })
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn observe<T>(&self, result: std::result::Result<T, sqlx::Error>) -> Result<T> {
        self.online.store(result.is_ok(), Ordering::SeqCst);
        Ok(result?)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        self.observe(sqlx::query(schema::CREATE_DOCUMENTS).execute(&self.pool).await)?;
        info!("Remote document store ready for project {}", self.project);
        Ok(())
    }

    pub async fn list<T: Entity>(&self) -> Result<Vec<T>> {
        let rows: Vec<Json<T>> = self.observe(
            sqlx::query_scalar(schema::SELECT_ALL)
                .bind(self.project.as_str())
                .bind(T::KIND.collection())
                .fetch_all(&self.pool)
                .await,
        )?;

        let mut items: Vec<T> = rows.into_iter().map(|row| row.0).collect();
        T::order(&mut items);
        Ok(items)
    }

    async fn notify(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        kind: Kind,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(schema::NOTIFY)
            .bind(schema::CHANGES_CHANNEL)
            .bind(topic(&self.project, kind))
            .execute(&mut *tx)
            .await?;
        Ok(())
    }

    async fn put<T: Entity>(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entity: &T,
    ) -> Result<()> {
        let body = serde_json::to_value(entity)?;
        self.observe(
            sqlx::query(upsert_for(T::KIND))
                .bind(self.project.as_str())
                .bind(T::KIND.collection())
                .bind(entity.id())
                .bind(Json(body))
                .execute(&mut *tx)
                .await,
        )?;
        self.observe(self.notify(tx, T::KIND).await)
    }

    /**
     * Returns how many option documents matched, zero when the option is not
     * part of `poll`
     */
    async fn bump(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        poll: &str,
        option: &str,
        delta: i64,
    ) -> Result<u64> {
        let done = self.observe(
            sqlx::query(schema::BUMP_OPTION)
                .bind(self.project.as_str())
                .bind(Kind::PollOptions.collection())
                .bind(option)
                .bind(poll)
                .bind(delta)
                .execute(&mut *tx)
                .await,
        )?;
        Ok(done.rows_affected())
    }

    pub async fn upsert<T: Entity>(&self, entity: &T) -> Result<()> {
        let mut tx = self.observe(self.pool.begin().await)?;
        self.put(&mut tx, entity).await?;
        self.observe(tx.commit().await)
    }

    pub async fn remove(&self, kind: Kind, id: &str) -> Result<bool> {
        let mut tx = self.observe(self.pool.begin().await)?;
        let done = self.observe(
            sqlx::query(schema::DELETE)
                .bind(self.project.as_str())
                .bind(kind.collection())
                .bind(id)
                .execute(&mut tx)
                .await,
        )?;

        let removed = done.rows_affected() > 0;
        if removed {
            self.observe(self.notify(&mut tx, kind).await)?;
        }
        self.observe(tx.commit().await)?;
        Ok(removed)
    }

    /**
     * Decrement, upsert and increment in one transaction. Dropping the
     * transaction on any error rolls all three back
     *
     * Concurrent casts for the same vote id wait on each other, so each one
     * sees the vote the previous one committed
     */
    pub async fn cast_poll_vote(&self, vote: &PollVote, previous: Option<&str>) -> Result<()> {
        let mut tx = self.observe(self.pool.begin().await)?;

        self.observe(
            sqlx::query(schema::LOCK_VOTE)
                .bind(vote_lock(&self.project, &vote.id))
                .execute(&mut tx)
                .await,
        )?;

        let stored: Option<Json<PollVote>> = self.observe(
            sqlx::query_scalar(schema::SELECT_ONE_FOR_UPDATE)
                .bind(self.project.as_str())
                .bind(Kind::PollVotes.collection())
                .bind(vote.id.as_str())
                .fetch_optional(&mut tx)
                .await,
        )?;
        let previous = super::resolve_previous(stored.as_ref().map(|row| &row.0), previous);

        let unknown = || Error::UnknownOption {
            poll: vote.poll_id.clone(),
            option: vote.option_id.clone(),
        };

        if previous.as_deref() == Some(vote.option_id.as_str()) {
            let option: Option<Json<PollOption>> = self.observe(
                sqlx::query_scalar(schema::SELECT_ONE)
                    .bind(self.project.as_str())
                    .bind(Kind::PollOptions.collection())
                    .bind(vote.option_id.as_str())
                    .fetch_optional(&mut tx)
                    .await,
            )?;
            if !option.map_or(false, |o| o.0.poll_id == vote.poll_id) {
                return Err(unknown());
            }
        }
        else {
            if let Some(prior) = previous.as_deref() {
                if self.bump(&mut tx, &vote.poll_id, prior, -1).await? == 0 {
                    warn!("Previous option {} of {} is gone, not decrementing", prior, vote.id);
                }
            }
            if self.bump(&mut tx, &vote.poll_id, &vote.option_id, 1).await? == 0 {
                return Err(unknown());
            }
            self.observe(self.notify(&mut tx, Kind::PollOptions).await)?;
        }

        self.put(&mut tx, vote).await?;
        self.observe(tx.commit().await)
    }

    /**
     * Spawn the listener task behind a subscription
     *
     * Nothing is delivered once `active` is cleared, and a failure to listen
     * is reported without ever invoking `on_change`
     */
    pub fn watch<T, F>(
        self: Arc<Self>,
        reporter: Arc<dyn Reporter>,
        active: Arc<AtomicBool>,
        on_change: F,
    ) -> JoinHandle<()>
    where
        T: Entity,
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        task::spawn(async move {
            if let Err(err) = self.follow(&active, &on_change).await {
                reporter.report(&format!("follow {}", T::KIND.collection()), &err);
            }
        })
    }

    async fn follow<T, F>(&self, active: &AtomicBool, on_change: &F) -> Result<()>
    where
        T: Entity,
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        let mut listener = self.observe(PgListener::connect_with(&self.pool).await)?;
        self.observe(listener.listen(schema::CHANGES_CHANNEL).await)?;
        let topic = topic(&self.project, T::KIND);
        debug!("Listening for {}", topic);

        let mut items = self.list::<T>().await?;
        loop {
            if !active.load(Ordering::SeqCst) {
                return Ok(());
            }
            on_change(items);

            loop {
                let notification = self.observe(listener.recv().await)?;
                if notification.payload() == topic {
                    break;
                }
            }
            items = self.list::<T>().await?;
        }
    }
}
