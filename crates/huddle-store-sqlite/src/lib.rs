//! SQLite implementation of the huddle [`Store`] trait.
//!
//! Runs on a single-connection pool; individual statements are atomic, and
//! the single connection serializes writers, which is what makes the
//! services' read-then-write invariant checks safe on this backend.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use huddle_storage::{
    BillingInterval, CreateEmailInviteParams, CreateTeamParams, CustomerId, EmailInvite, Store,
    StoreError, Subscription, SubscriptionStatus, Team, TeamId, TeamMember, TeamRole,
    UpsertSubscriptionParams,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const TEAM_COLS: &str =
    "id, name, slug, image_url, shareable_invite_code, billing_customer_id, created_at, updated_at";
const MEMBER_COLS: &str = "team_id, customer_id, role, invited_by, joined_at, updated_at";
const INVITE_COLS: &str = "team_id, email, role, code, invited_by, created_at";
const SUBSCRIPTION_COLS: &str = "team_id, external_id, external_item_id, status, product_id, \
     price_id, billing_interval, quantity, current_period_seats, current_period_end, created_at, \
     updated_at";

type TeamRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
    i64,
);
type MemberRow = (String, String, String, Option<String>, i64, i64);
type InviteRow = (String, String, String, String, String, i64);
type SubscriptionRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    i64,
    i64,
);

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// `~/.huddle/store.db` (creates dir with 0700 perms on unix)
    pub async fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| StoreError::Backend("no home dir".into()))?
            .join(".huddle");
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let path = dir.join("store.db");
        let url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        Self::open(&url).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn backend_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn insert_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists,
        _ => backend_err(e),
    }
}

fn parse_id(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(|e| StoreError::Backend(e.to_string()))
}

fn parse_ts(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Backend(format!("invalid timestamp: {}", secs)))
}

fn team_from_row(row: TeamRow) -> Result<Team, StoreError> {
    let (id, name, slug, image_url, shareable_invite_code, billing_customer_id, created, updated) =
        row;
    Ok(Team {
        id: TeamId(parse_id(&id)?),
        name,
        slug,
        image_url,
        shareable_invite_code,
        billing_customer_id,
        created_at: parse_ts(created)?,
        updated_at: parse_ts(updated)?,
    })
}

fn member_from_row(row: MemberRow) -> Result<TeamMember, StoreError> {
    let (team_id, customer_id, role, invited_by, joined, updated) = row;
    Ok(TeamMember {
        team_id: TeamId(parse_id(&team_id)?),
        customer_id: CustomerId(parse_id(&customer_id)?),
        role: role
            .parse::<TeamRole>()
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        invited_by: invited_by
            .as_deref()
            .map(|id| Ok::<_, StoreError>(CustomerId(parse_id(id)?)))
            .transpose()?,
        joined_at: parse_ts(joined)?,
        updated_at: parse_ts(updated)?,
    })
}

fn invite_from_row(row: InviteRow) -> Result<EmailInvite, StoreError> {
    let (team_id, email, role, code, invited_by, created) = row;
    Ok(EmailInvite {
        team_id: TeamId(parse_id(&team_id)?),
        email,
        role: role
            .parse::<TeamRole>()
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        code,
        invited_by: CustomerId(parse_id(&invited_by)?),
        created_at: parse_ts(created)?,
    })
}

fn subscription_from_row(row: SubscriptionRow) -> Result<Subscription, StoreError> {
    let (
        team_id,
        external_id,
        external_item_id,
        status,
        product_id,
        price_id,
        interval,
        quantity,
        current_period_seats,
        period_end,
        created,
        updated,
    ) = row;
    Ok(Subscription {
        team_id: TeamId(parse_id(&team_id)?),
        external_id,
        external_item_id,
        status: status
            .parse::<SubscriptionStatus>()
            .map_err(StoreError::Backend)?,
        product_id,
        price_id,
        interval: interval
            .parse::<BillingInterval>()
            .map_err(StoreError::Backend)?,
        quantity: quantity as i32,
        current_period_seats: current_period_seats as i32,
        current_period_end: parse_ts(period_end)?,
        created_at: parse_ts(created)?,
        updated_at: parse_ts(updated)?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Teams ─────────────────────────────

    async fn create_team(&self, params: &CreateTeamParams) -> Result<Team, StoreError> {
        let team_id = Uuid::now_v7();
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO teams(id, name, slug, image_url, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)",
        )
        .bind(team_id.to_string())
        .bind(&params.name)
        .bind(&params.slug)
        .bind(&params.image_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;

        Ok(Team {
            id: TeamId(team_id),
            name: params.name.clone(),
            slug: params.slug.clone(),
            image_url: params.image_url.clone(),
            shareable_invite_code: None,
            billing_customer_id: None,
            created_at: parse_ts(now)?,
            updated_at: parse_ts(now)?,
        })
    }

    async fn get_team(&self, team_id: &TeamId) -> Result<Team, StoreError> {
        let row = sqlx::query_as::<_, TeamRow>(&format!(
            "SELECT {} FROM teams WHERE id = ?",
            TEAM_COLS
        ))
        .bind(team_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or(StoreError::NotFound)?;
        team_from_row(row)
    }

    async fn get_team_by_slug(&self, slug: &str) -> Result<Team, StoreError> {
        let row = sqlx::query_as::<_, TeamRow>(&format!(
            "SELECT {} FROM teams WHERE slug = ?",
            TEAM_COLS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or(StoreError::NotFound)?;
        team_from_row(row)
    }

    async fn get_team_by_billing_customer(
        &self,
        billing_customer_id: &str,
    ) -> Result<Team, StoreError> {
        let row = sqlx::query_as::<_, TeamRow>(&format!(
            "SELECT {} FROM teams WHERE billing_customer_id = ?",
            TEAM_COLS
        ))
        .bind(billing_customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or(StoreError::NotFound)?;
        team_from_row(row)
    }

    async fn set_shareable_invite_code(
        &self,
        team_id: &TeamId,
        code: Option<String>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE teams SET shareable_invite_code = ?, updated_at = ? WHERE id = ?")
                .bind(code)
                .bind(Utc::now().timestamp())
                .bind(team_id.0.to_string())
                .execute(&self.pool)
                .await
                .map_err(backend_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_team_billing_customer(
        &self,
        team_id: &TeamId,
        billing_customer_id: &str,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE teams SET billing_customer_id = ?, updated_at = ? WHERE id = ?")
                .bind(billing_customer_id)
                .bind(Utc::now().timestamp())
                .bind(team_id.0.to_string())
                .execute(&self.pool)
                .await
                .map_err(backend_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────── Members ─────────────────────────────

    async fn add_team_member(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
        role: TeamRole,
        invited_by: Option<CustomerId>,
    ) -> Result<(), StoreError> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO team_members(team_id, customer_id, role, invited_by, joined_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)",
        )
        .bind(team_id.0.to_string())
        .bind(customer_id.0.to_string())
        .bind(role.as_str())
        .bind(invited_by.map(|id| id.0.to_string()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;
        Ok(())
    }

    async fn get_team_member(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
    ) -> Result<TeamMember, StoreError> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM team_members WHERE team_id = ? AND customer_id = ?",
            MEMBER_COLS
        ))
        .bind(team_id.0.to_string())
        .bind(customer_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or(StoreError::NotFound)?;
        member_from_row(row)
    }

    async fn list_team_members(&self, team_id: &TeamId) -> Result<Vec<TeamMember>, StoreError> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM team_members WHERE team_id = ? ORDER BY joined_at",
            MEMBER_COLS
        ))
        .bind(team_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(member_from_row).collect()
    }

    async fn count_team_members(&self, team_id: &TeamId) -> Result<i32, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM team_members WHERE team_id = ?")
                .bind(team_id.0.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(backend_err)?;
        Ok(count as i32)
    }

    async fn count_team_owners(&self, team_id: &TeamId) -> Result<i32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM team_members WHERE team_id = ? AND role = 'owner'",
        )
        .bind(team_id.0.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(count as i32)
    }

    async fn update_team_member_role(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
        role: TeamRole,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE team_members SET role = ?, updated_at = ? WHERE team_id = ? AND customer_id = ?",
        )
        .bind(role.as_str())
        .bind(Utc::now().timestamp())
        .bind(team_id.0.to_string())
        .bind(customer_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn remove_team_member(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("DELETE FROM team_members WHERE team_id = ? AND customer_id = ?")
                .bind(team_id.0.to_string())
                .bind(customer_id.0.to_string())
                .execute(&self.pool)
                .await
                .map_err(backend_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────── Email invites ─────────────────────────────

    async fn create_email_invite(
        &self,
        params: &CreateEmailInviteParams,
    ) -> Result<EmailInvite, StoreError> {
        let now = Utc::now().timestamp();
        // INSERT OR REPLACE keyed on (team_id, email): a reissued invite
        // replaces the outstanding one instead of piling up.
        sqlx::query(
            "INSERT OR REPLACE INTO email_invites(team_id, email, role, code, invited_by, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
        )
        .bind(params.team_id.0.to_string())
        .bind(&params.email)
        .bind(params.role.as_str())
        .bind(&params.code)
        .bind(params.invited_by.0.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(EmailInvite {
            team_id: params.team_id.clone(),
            email: params.email.clone(),
            role: params.role,
            code: params.code.clone(),
            invited_by: params.invited_by.clone(),
            created_at: parse_ts(now)?,
        })
    }

    async fn get_email_invite_by_code(
        &self,
        team_id: &TeamId,
        code: &str,
    ) -> Result<EmailInvite, StoreError> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            "SELECT {} FROM email_invites WHERE team_id = ? AND code = ?",
            INVITE_COLS
        ))
        .bind(team_id.0.to_string())
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or(StoreError::NotFound)?;
        invite_from_row(row)
    }

    async fn list_email_invites(&self, team_id: &TeamId) -> Result<Vec<EmailInvite>, StoreError> {
        let rows = sqlx::query_as::<_, InviteRow>(&format!(
            "SELECT {} FROM email_invites WHERE team_id = ? ORDER BY created_at",
            INVITE_COLS
        ))
        .bind(team_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;
        rows.into_iter().map(invite_from_row).collect()
    }

    async fn delete_email_invite(&self, team_id: &TeamId, code: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM email_invites WHERE team_id = ? AND code = ?")
            .bind(team_id.0.to_string())
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────── Active team ─────────────────────────────

    async fn get_active_team(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<TeamId>, StoreError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT team_id FROM active_teams WHERE customer_id = ?",
        )
        .bind(customer_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;
        match row {
            Some((team_id,)) => Ok(Some(TeamId(parse_id(&team_id)?))),
            None => Ok(None),
        }
    }

    async fn set_active_team(
        &self,
        customer_id: &CustomerId,
        team_id: &TeamId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO active_teams(customer_id, team_id, updated_at) VALUES(?, ?, ?)
             ON CONFLICT(customer_id)
             DO UPDATE SET team_id = excluded.team_id, updated_at = excluded.updated_at",
        )
        .bind(customer_id.0.to_string())
        .bind(team_id.0.to_string())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn clear_active_team(&self, customer_id: &CustomerId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM active_teams WHERE customer_id = ?")
            .bind(customer_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    // ───────────────────────────── Subscriptions ─────────────────────────────

    async fn get_subscription(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE team_id = ?",
            SUBSCRIPTION_COLS
        ))
        .bind(team_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;
        row.map(subscription_from_row).transpose()
    }

    async fn upsert_subscription(
        &self,
        params: &UpsertSubscriptionParams,
    ) -> Result<Subscription, StoreError> {
        let now = Utc::now().timestamp();
        let existing_created: Option<i64> =
            sqlx::query_scalar("SELECT created_at FROM subscriptions WHERE external_id = ?")
                .bind(&params.external_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend_err)?;
        let created = existing_created.unwrap_or(now);

        // INSERT OR REPLACE lands redelivered events on the same row, whether
        // the conflict is on the external id or on the team's 1:1 slot.
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO subscriptions({}) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SUBSCRIPTION_COLS
        ))
        .bind(params.team_id.0.to_string())
        .bind(&params.external_id)
        .bind(&params.external_item_id)
        .bind(params.status.as_str())
        .bind(&params.product_id)
        .bind(&params.price_id)
        .bind(params.interval.as_str())
        .bind(params.quantity as i64)
        .bind(params.quantity as i64) // provider-reported quantity is what's billed this period
        .bind(params.current_period_end.timestamp())
        .bind(created)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        Ok(Subscription {
            team_id: params.team_id.clone(),
            external_id: params.external_id.clone(),
            external_item_id: params.external_item_id.clone(),
            status: params.status,
            product_id: params.product_id.clone(),
            price_id: params.price_id.clone(),
            interval: params.interval,
            quantity: params.quantity,
            current_period_seats: params.quantity,
            current_period_end: params.current_period_end,
            created_at: parse_ts(created)?,
            updated_at: parse_ts(now)?,
        })
    }

    async fn set_subscription_seats(
        &self,
        team_id: &TeamId,
        quantity: i32,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET quantity = ?, current_period_seats = ?, updated_at = ?
             WHERE team_id = ?",
        )
        .bind(quantity as i64)
        .bind(quantity as i64)
        .bind(Utc::now().timestamp())
        .bind(team_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_subscription_canceled(&self, external_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'canceled', updated_at = ? WHERE external_id = ?",
        )
        .bind(Utc::now().timestamp())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
