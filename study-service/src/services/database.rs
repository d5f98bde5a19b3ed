//! Database service for study-service.

use crate::models::{
    membership::{
        DEFAULT_DAILY_TOKEN_LIMIT, DEFAULT_MAX_CONCURRENT_CHATS, DEFAULT_MONTHLY_TOKEN_LIMIT,
        DEFAULT_WEEKLY_TOKEN_LIMIT,
    },
    ChatMessage, ChatSession, Class, ClassDocument, ClassMembership, MembershipPatch,
    ProcessingStatus, RecordUsage, UsageRecord, UsageTracker,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "study-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Class Operations
    // =========================================================================

    /// Create a class and enroll the owner as a sponsored manager in one
    /// transaction.
    #[instrument(skip(self, name, description), fields(owner_id = %owner_id))]
    pub async fn create_class(
        &self,
        owner_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Class, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_class"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let class = {
            let mut attempt = 0;
            loop {
                let code = generate_class_code();
                let inserted = sqlx::query_as::<_, Class>(
                    r#"
                    INSERT INTO classes (class_id, name, description, class_code, owner_id)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (class_code) DO NOTHING
                    RETURNING class_id, name, description, class_code, owner_id, is_active, created_utc
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(name)
                .bind(description)
                .bind(&code)
                .bind(owner_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

                match inserted {
                    Some(class) => break class,
                    None => {
                        attempt += 1;
                        if attempt >= 5 {
                            return Err(AppError::DatabaseError(anyhow::anyhow!(
                                "Failed to generate a unique class code"
                            )));
                        }
                    }
                }
            }
        };

        sqlx::query(
            r#"
            INSERT INTO class_memberships
                (membership_id, user_id, class_id, is_manager, can_chat, max_concurrent_chats,
                 is_sponsored, daily_token_limit, weekly_token_limit, monthly_token_limit)
            VALUES ($1, $2, $3, TRUE, TRUE, $4, TRUE, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(class.class_id)
        .bind(DEFAULT_MAX_CONCURRENT_CHATS)
        .bind(DEFAULT_DAILY_TOKEN_LIMIT)
        .bind(DEFAULT_WEEKLY_TOKEN_LIMIT)
        .bind(DEFAULT_MONTHLY_TOKEN_LIMIT)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        timer.observe_duration();
        Ok(class)
    }

    #[instrument(skip(self))]
    pub async fn get_class(&self, class_id: Uuid) -> Result<Option<Class>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_class"])
            .start_timer();

        let class = sqlx::query_as::<_, Class>(
            "SELECT class_id, name, description, class_code, owner_id, is_active, created_utc
             FROM classes WHERE class_id = $1",
        )
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(class)
    }

    #[instrument(skip(self))]
    pub async fn find_class_by_code(&self, class_code: &str) -> Result<Option<Class>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_class_by_code"])
            .start_timer();

        let class = sqlx::query_as::<_, Class>(
            "SELECT class_id, name, description, class_code, owner_id, is_active, created_utc
             FROM classes WHERE class_code = $1 AND is_active = TRUE",
        )
        .bind(class_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(class)
    }

    /// All active classes the user belongs to.
    #[instrument(skip(self))]
    pub async fn list_user_classes(&self, user_id: Uuid) -> Result<Vec<Class>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_user_classes"])
            .start_timer();

        let classes = sqlx::query_as::<_, Class>(
            r#"
            SELECT c.class_id, c.name, c.description, c.class_code, c.owner_id, c.is_active, c.created_utc
            FROM classes c
            JOIN class_memberships m ON m.class_id = c.class_id
            WHERE m.user_id = $1 AND c.is_active = TRUE
            ORDER BY c.created_utc DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(classes)
    }

    #[instrument(skip(self, name, description))]
    pub async fn update_class(
        &self,
        class_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Class>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_class"])
            .start_timer();

        let class = sqlx::query_as::<_, Class>(
            r#"
            UPDATE classes
            SET name = COALESCE($2, name),
                description = COALESCE($3, description)
            WHERE class_id = $1
            RETURNING class_id, name, description, class_code, owner_id, is_active, created_utc
            "#,
        )
        .bind(class_id)
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(class)
    }

    /// Delete a class. Memberships, trackers, sessions, messages, and
    /// documents cascade; ledger rows are kept.
    #[instrument(skip(self))]
    pub async fn delete_class(&self, class_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_class"])
            .start_timer();

        let result = sqlx::query("DELETE FROM classes WHERE class_id = $1")
            .bind(class_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    /// Member, session, and document counts for a class overview.
    #[instrument(skip(self))]
    pub async fn class_counts(&self, class_id: Uuid) -> Result<(i64, i64, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["class_counts"])
            .start_timer();

        let counts: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM class_memberships WHERE class_id = $1),
                (SELECT COUNT(*) FROM chat_sessions WHERE class_id = $1),
                (SELECT COUNT(*) FROM class_documents WHERE class_id = $1)
            "#,
        )
        .bind(class_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(counts)
    }

    // =========================================================================
    // Membership Operations
    // =========================================================================

    /// Enroll a user with default quotas. Fails with a conflict if the user
    /// is already a member.
    #[instrument(skip(self))]
    pub async fn create_membership(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<ClassMembership, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_membership"])
            .start_timer();

        let membership = sqlx::query_as::<_, ClassMembership>(
            r#"
            INSERT INTO class_memberships
                (membership_id, user_id, class_id, is_manager, can_chat, max_concurrent_chats,
                 is_sponsored, daily_token_limit, weekly_token_limit, monthly_token_limit)
            VALUES ($1, $2, $3, FALSE, TRUE, $4, FALSE, $5, $6, $7)
            ON CONFLICT (user_id, class_id) DO NOTHING
            RETURNING membership_id, user_id, class_id, is_manager, can_chat, max_concurrent_chats,
                      is_sponsored, daily_token_limit, weekly_token_limit, monthly_token_limit, joined_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(class_id)
        .bind(DEFAULT_MAX_CONCURRENT_CHATS)
        .bind(DEFAULT_DAILY_TOKEN_LIMIT)
        .bind(DEFAULT_WEEKLY_TOKEN_LIMIT)
        .bind(DEFAULT_MONTHLY_TOKEN_LIMIT)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| AppError::Conflict(anyhow::anyhow!("User is already a member")))?;

        timer.observe_duration();
        Ok(membership)
    }

    #[instrument(skip(self))]
    pub async fn get_membership(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<ClassMembership>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_membership"])
            .start_timer();

        let membership = sqlx::query_as::<_, ClassMembership>(
            r#"
            SELECT membership_id, user_id, class_id, is_manager, can_chat, max_concurrent_chats,
                   is_sponsored, daily_token_limit, weekly_token_limit, monthly_token_limit, joined_utc
            FROM class_memberships
            WHERE user_id = $1 AND class_id = $2
            "#,
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(membership)
    }

    /// Lock a membership row for the duration of the enclosing transaction.
    pub async fn get_membership_for_update(
        conn: &mut PgConnection,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<ClassMembership>, AppError> {
        sqlx::query_as::<_, ClassMembership>(
            r#"
            SELECT membership_id, user_id, class_id, is_manager, can_chat, max_concurrent_chats,
                   is_sponsored, daily_token_limit, weekly_token_limit, monthly_token_limit, joined_utc
            FROM class_memberships
            WHERE user_id = $1 AND class_id = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_optional(conn)
        .await
        .map_err(db_err)
    }

    #[instrument(skip(self))]
    pub async fn list_members(&self, class_id: Uuid) -> Result<Vec<ClassMembership>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_members"])
            .start_timer();

        let members = sqlx::query_as::<_, ClassMembership>(
            r#"
            SELECT membership_id, user_id, class_id, is_manager, can_chat, max_concurrent_chats,
                   is_sponsored, daily_token_limit, weekly_token_limit, monthly_token_limit, joined_utc
            FROM class_memberships
            WHERE class_id = $1
            ORDER BY joined_utc
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(members)
    }

    /// Apply a validated membership patch.
    #[instrument(skip(self, patch))]
    pub async fn update_membership(
        &self,
        user_id: Uuid,
        class_id: Uuid,
        patch: &MembershipPatch,
    ) -> Result<Option<ClassMembership>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_membership"])
            .start_timer();

        let membership = sqlx::query_as::<_, ClassMembership>(
            r#"
            UPDATE class_memberships
            SET is_manager = COALESCE($3, is_manager),
                can_chat = COALESCE($4, can_chat),
                max_concurrent_chats = COALESCE($5, max_concurrent_chats),
                is_sponsored = COALESCE($6, is_sponsored),
                daily_token_limit = COALESCE($7, daily_token_limit),
                weekly_token_limit = COALESCE($8, weekly_token_limit),
                monthly_token_limit = COALESCE($9, monthly_token_limit)
            WHERE user_id = $1 AND class_id = $2
            RETURNING membership_id, user_id, class_id, is_manager, can_chat, max_concurrent_chats,
                      is_sponsored, daily_token_limit, weekly_token_limit, monthly_token_limit, joined_utc
            "#,
        )
        .bind(user_id)
        .bind(class_id)
        .bind(patch.is_manager)
        .bind(patch.can_chat)
        .bind(patch.max_concurrent_chats)
        .bind(patch.is_sponsored)
        .bind(patch.daily_token_limit)
        .bind(patch.weekly_token_limit)
        .bind(patch.monthly_token_limit)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(membership)
    }

    /// Flip sponsorship for every non-manager member of a class. Returns the
    /// number of memberships touched.
    #[instrument(skip(self))]
    pub async fn set_class_sponsorship(
        &self,
        class_id: Uuid,
        is_sponsored: bool,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_class_sponsorship"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE class_memberships SET is_sponsored = $2
             WHERE class_id = $1 AND is_manager = FALSE",
        )
        .bind(class_id)
        .bind(is_sponsored)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    pub async fn delete_membership(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_membership"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM class_usage_trackers WHERE user_id = $1 AND class_id = $2")
            .bind(user_id)
            .bind(class_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let result =
            sqlx::query("DELETE FROM class_memberships WHERE user_id = $1 AND class_id = $2")
                .bind(user_id)
                .bind(class_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Usage Tracker Operations
    // =========================================================================

    /// Fetch the tracker row locked for update, creating it on first touch.
    /// Must run inside a transaction; the lock is what serializes concurrent
    /// gate checks and commits for the same member.
    pub async fn fetch_or_create_tracker(
        conn: &mut PgConnection,
        user_id: Uuid,
        class_id: Uuid,
        today: NaiveDate,
    ) -> Result<UsageTracker, AppError> {
        sqlx::query(
            r#"
            INSERT INTO class_usage_trackers
                (tracker_id, user_id, class_id, last_daily_reset, last_weekly_reset, last_monthly_reset)
            VALUES ($1, $2, $3, $4, $4, $4)
            ON CONFLICT (user_id, class_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(class_id)
        .bind(today)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

        sqlx::query_as::<_, UsageTracker>(
            r#"
            SELECT tracker_id, user_id, class_id, daily_tokens_used, weekly_tokens_used,
                   monthly_tokens_used, last_daily_reset, last_weekly_reset, last_monthly_reset
            FROM class_usage_trackers
            WHERE user_id = $1 AND class_id = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_one(conn)
        .await
        .map_err(db_err)
    }

    /// Persist tracker counters and watermarks after resets or a commit.
    pub async fn store_tracker(
        conn: &mut PgConnection,
        tracker: &UsageTracker,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE class_usage_trackers
            SET daily_tokens_used = $2,
                weekly_tokens_used = $3,
                monthly_tokens_used = $4,
                last_daily_reset = $5,
                last_weekly_reset = $6,
                last_monthly_reset = $7
            WHERE tracker_id = $1
            "#,
        )
        .bind(tracker.tracker_id)
        .bind(tracker.daily_tokens_used)
        .bind(tracker.weekly_tokens_used)
        .bind(tracker.monthly_tokens_used)
        .bind(tracker.last_daily_reset)
        .bind(tracker.last_weekly_reset)
        .bind(tracker.last_monthly_reset)
        .execute(conn)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    // =========================================================================
    // Chat Session Operations
    // =========================================================================

    pub async fn count_active_sessions(
        conn: &mut PgConnection,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM chat_sessions
             WHERE user_id = $1 AND class_id = $2 AND is_active = TRUE",
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_one(conn)
        .await
        .map_err(db_err)?;

        Ok(count)
    }

    pub async fn insert_session(
        conn: &mut PgConnection,
        user_id: Uuid,
        class_id: Uuid,
        title: &str,
    ) -> Result<ChatSession, AppError> {
        sqlx::query_as::<_, ChatSession>(
            r#"
            INSERT INTO chat_sessions (session_id, user_id, class_id, title)
            VALUES ($1, $2, $3, $4)
            RETURNING session_id, user_id, class_id, title, is_active, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(class_id)
        .bind(title)
        .fetch_one(conn)
        .await
        .map_err(db_err)
    }

    #[instrument(skip(self))]
    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<ChatSession>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_session"])
            .start_timer();

        let session = sqlx::query_as::<_, ChatSession>(
            "SELECT session_id, user_id, class_id, title, is_active, created_utc, updated_utc
             FROM chat_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(session)
    }

    #[instrument(skip(self))]
    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<Vec<ChatSession>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_sessions"])
            .start_timer();

        let sessions = sqlx::query_as::<_, ChatSession>(
            "SELECT session_id, user_id, class_id, title, is_active, created_utc, updated_utc
             FROM chat_sessions
             WHERE user_id = $1 AND class_id = $2
             ORDER BY updated_utc DESC",
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(sessions)
    }

    /// Close a session, releasing its concurrency slot.
    #[instrument(skip(self))]
    pub async fn close_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatSession>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["close_session"])
            .start_timer();

        let session = sqlx::query_as::<_, ChatSession>(
            r#"
            UPDATE chat_sessions
            SET is_active = FALSE, updated_utc = NOW()
            WHERE session_id = $1 AND user_id = $2
            RETURNING session_id, user_id, class_id, title, is_active, created_utc, updated_utc
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(session)
    }

    #[instrument(skip(self))]
    pub async fn touch_session(&self, session_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE chat_sessions SET updated_utc = NOW() WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // =========================================================================
    // Chat Message Operations
    // =========================================================================

    #[instrument(skip(self, content, context_used))]
    pub async fn insert_message(
        &self,
        session_id: Uuid,
        content: &str,
        is_user: bool,
        tokens_used: i64,
        response_time_ms: Option<i32>,
        context_used: Option<&str>,
    ) -> Result<ChatMessage, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_message"])
            .start_timer();

        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages
                (message_id, session_id, content, is_user, tokens_used, response_time_ms, context_used)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING message_id, session_id, content, is_user, tokens_used, response_time_ms,
                      context_used, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(content)
        .bind(is_user)
        .bind(tokens_used)
        .bind(response_time_ms)
        .bind(context_used)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(message)
    }

    #[instrument(skip(self))]
    pub async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_messages"])
            .start_timer();

        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT message_id, session_id, content, is_user, tokens_used, response_time_ms,
                    context_used, created_utc
             FROM chat_messages
             WHERE session_id = $1
             ORDER BY created_utc",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(messages)
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    #[instrument(skip(self, title, source_url, extracted_text))]
    pub async fn create_document(
        &self,
        class_id: Uuid,
        session_id: Option<Uuid>,
        uploaded_by: Uuid,
        title: &str,
        source_url: Option<&str>,
        extracted_text: Option<&str>,
        status: ProcessingStatus,
    ) -> Result<ClassDocument, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_document"])
            .start_timer();

        let document = sqlx::query_as::<_, ClassDocument>(
            r#"
            INSERT INTO class_documents
                (document_id, class_id, session_id, title, source_url, extracted_text,
                 processing_status, uploaded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING document_id, class_id, session_id, title, source_url, extracted_text,
                      processing_status, uploaded_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(class_id)
        .bind(session_id)
        .bind(title)
        .bind(source_url)
        .bind(extracted_text)
        .bind(status.as_str())
        .bind(uploaded_by)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(document)
    }

    #[instrument(skip(self))]
    pub async fn list_documents(&self, class_id: Uuid) -> Result<Vec<ClassDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_documents"])
            .start_timer();

        let documents = sqlx::query_as::<_, ClassDocument>(
            "SELECT document_id, class_id, session_id, title, source_url, extracted_text,
                    processing_status, uploaded_by, created_utc
             FROM class_documents
             WHERE class_id = $1
             ORDER BY created_utc DESC",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(documents)
    }

    /// Completed documents eligible as chat context: class-wide ones plus
    /// any scoped to the given session.
    #[instrument(skip(self))]
    pub async fn completed_context_documents(
        &self,
        class_id: Uuid,
        session_id: Uuid,
    ) -> Result<Vec<ClassDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["completed_context_documents"])
            .start_timer();

        let documents = sqlx::query_as::<_, ClassDocument>(
            r#"
            SELECT document_id, class_id, session_id, title, source_url, extracted_text,
                   processing_status, uploaded_by, created_utc
            FROM class_documents
            WHERE class_id = $1
              AND processing_status = 'completed'
              AND (session_id IS NULL OR session_id = $2)
            ORDER BY created_utc
            "#,
        )
        .bind(class_id)
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(documents)
    }

    // =========================================================================
    // Usage Ledger Operations
    // =========================================================================

    /// Append a ledger row. Ledger rows are never updated or deleted.
    #[instrument(skip(self, input), fields(class_id = %input.class_id))]
    pub async fn insert_usage_record(&self, input: &RecordUsage) -> Result<UsageRecord, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_usage_record"])
            .start_timer();

        let record = sqlx::query_as::<_, UsageRecord>(
            r#"
            INSERT INTO usage_records
                (record_id, user_id, billed_to_user_id, class_id, session_id, model_name,
                 operation_type, input_tokens, output_tokens, cost, is_sponsored, is_overflow)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING record_id, user_id, billed_to_user_id, class_id, session_id, model_name,
                      operation_type, input_tokens, output_tokens, total_tokens, cost,
                      is_sponsored, is_overflow, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(input.billed_to_user_id)
        .bind(input.class_id)
        .bind(input.session_id)
        .bind(&input.model_name)
        .bind(&input.operation_type)
        .bind(input.input_tokens)
        .bind(input.output_tokens)
        .bind(input.cost)
        .bind(input.is_sponsored)
        .bind(input.is_overflow)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn list_usage_records(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<Vec<UsageRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_usage_records"])
            .start_timer();

        let records = sqlx::query_as::<_, UsageRecord>(
            "SELECT record_id, user_id, billed_to_user_id, class_id, session_id, model_name,
                    operation_type, input_tokens, output_tokens, total_tokens, cost,
                    is_sponsored, is_overflow, created_utc
             FROM usage_records
             WHERE user_id = $1 AND class_id = $2
             ORDER BY created_utc DESC",
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(records)
    }

    /// Timestamp of the member's most recent completed turn in the class.
    #[instrument(skip(self))]
    pub async fn last_activity(
        &self,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["last_activity"])
            .start_timer();

        let (last,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            "SELECT MAX(created_utc) FROM usage_records WHERE user_id = $1 AND class_id = $2",
        )
        .bind(user_id)
        .bind(class_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        timer.observe_duration();
        Ok(last)
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}", e))
}

/// Short join code: 8 uppercase hex characters from a fresh UUID.
fn generate_class_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}
