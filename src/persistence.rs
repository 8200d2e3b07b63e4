//! SQLite persistence for users, ideas, shortlists and messages

use crate::error::VaultError;
use crate::models::{
    Category, FounderSummary, IdeaRecord, Message, NewUser, Participant, Role, ShortlistEntry,
    Stage, User, Visibility,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{ffi, params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::sync::Mutex;

/// Filters for idea listings. `None` fields do not constrain the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdeaFilter {
    pub founder_id: Option<String>,
    /// Restrict to PUBLIC ideas that are verified
    pub public_verified_only: bool,
    pub category: Option<Category>,
    pub stage: Option<Stage>,
    /// Substring of the location
    pub location: Option<String>,
    /// Substring of title or description
    pub search: Option<String>,
}

impl IdeaFilter {
    fn where_clause(&self) -> (String, Vec<SqlValue>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(founder_id) = &self.founder_id {
            clauses.push("i.founder_id = ?");
            values.push(SqlValue::Text(founder_id.clone()));
        }
        if self.public_verified_only {
            clauses.push("i.visibility = 'PUBLIC' AND i.is_verified = 1");
        }
        if let Some(category) = self.category {
            clauses.push("i.category = ?");
            values.push(SqlValue::Text(category.as_str().to_string()));
        }
        if let Some(stage) = self.stage {
            clauses.push("i.stage = ?");
            values.push(SqlValue::Text(stage.as_str().to_string()));
        }
        if let Some(location) = &self.location {
            clauses.push("instr(lower(coalesce(i.location, '')), lower(?)) > 0");
            values.push(SqlValue::Text(location.clone()));
        }
        if let Some(search) = &self.search {
            clauses.push("(instr(lower(i.title), lower(?)) > 0 OR instr(lower(i.description), lower(?)) > 0)");
            values.push(SqlValue::Text(search.clone()));
            values.push(SqlValue::Text(search.clone()));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

/// Storage operations used by the workflow and query layers.
pub trait Persistence: Send + Sync {
    fn create_user(&self, user: NewUser) -> Result<User, VaultError>;
    fn find_user_by_id(&self, id: &str) -> Result<Option<User>, VaultError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, VaultError>;
    fn update_wallet(&self, user_id: &str, wallet_address: &str) -> Result<(), VaultError>;

    /// Inserts a new idea. A clash on `idea_hash` is `VaultError::Duplicate`.
    fn insert_idea(&self, idea: &IdeaRecord) -> Result<(), VaultError>;
    fn find_idea(&self, id: &str) -> Result<Option<IdeaRecord>, VaultError>;
    fn find_idea_by_hash(&self, idea_hash: &str) -> Result<Option<IdeaRecord>, VaultError>;
    fn list_ideas(&self, filter: &IdeaFilter, offset: u64, limit: u64) -> Result<Vec<IdeaRecord>, VaultError>;
    fn count_ideas(&self, filter: &IdeaFilter) -> Result<u64, VaultError>;
    fn count_all_ideas(&self, verified_only: bool) -> Result<u64, VaultError>;
    fn set_idea_verified(&self, id: &str, verified: bool) -> Result<(), VaultError>;

    fn upsert_shortlist(&self, investor_id: &str, idea_id: &str, note: Option<&str>) -> Result<ShortlistEntry, VaultError>;
    fn list_shortlist(&self, investor_id: &str) -> Result<Vec<ShortlistEntry>, VaultError>;

    fn insert_message(&self, message: &Message) -> Result<(), VaultError>;
    /// Messages on one idea where the user is sender or receiver, oldest first.
    fn conversation(&self, idea_id: &str, user_id: &str) -> Result<Vec<Message>, VaultError>;
    /// Latest message per idea involving the user, newest first.
    fn inbox(&self, user_id: &str) -> Result<Vec<Message>, VaultError>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, company, location, bio, \
     linkedin_url, wallet_address, is_verified, created_at";

const IDEA_SELECT: &str = "SELECT i.id, i.title, i.description, i.category, i.stage, i.location, \
     i.funding_goal, i.team_size, i.visibility, i.idea_hash, i.txn_id, i.app_id, \
     i.block_timestamp, i.content_cid, i.pitch_deck_cid, i.registered_at, i.is_verified, \
     i.founder_id, i.created_at, u.id, u.name, u.company, u.location, u.wallet_address, \
     u.is_verified \
     FROM ideas i LEFT JOIN users u ON u.id = i.founder_id";

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, m.receiver_id, m.idea_id, m.content, \
     m.created_at, s.name, s.role, r.name, r.role, i.title \
     FROM messages m \
     LEFT JOIN users s ON s.id = m.sender_id \
     LEFT JOIN users r ON r.id = m.receiver_id \
     LEFT JOIN ideas i ON i.id = m.idea_id";

fn parse_column<T: std::str::FromStr>(idx: usize, text: String) -> rusqlite::Result<T> {
    text.parse::<T>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unexpected value: {}", text).into(),
        )
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: parse_column::<Role>(4, row.get(4)?)?,
        company: row.get(5)?,
        location: row.get(6)?,
        bio: row.get(7)?,
        linkedin_url: row.get(8)?,
        wallet_address: row.get(9)?,
        is_verified: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn idea_from_row(row: &Row) -> rusqlite::Result<IdeaRecord> {
    let founder_id: Option<String> = row.get(19)?;
    let founder = match founder_id {
        Some(id) => Some(FounderSummary {
            id,
            name: row.get(20)?,
            company: row.get(21)?,
            location: row.get(22)?,
            wallet_address: row.get(23)?,
            is_verified: row.get(24)?,
        }),
        None => None,
    };
    let block_timestamp: i64 = row.get(12)?;

    Ok(IdeaRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: parse_column::<Category>(3, row.get(3)?)?,
        stage: parse_column::<Stage>(4, row.get(4)?)?,
        location: row.get(5)?,
        funding_goal: row.get(6)?,
        team_size: row.get(7)?,
        visibility: parse_column::<Visibility>(8, row.get(8)?)?,
        idea_hash: row.get(9)?,
        txn_id: row.get(10)?,
        app_id: row.get(11)?,
        block_timestamp: block_timestamp as u64,
        content_cid: row.get(13)?,
        pitch_deck_cid: row.get(14)?,
        registered_at: row.get(15)?,
        is_verified: row.get(16)?,
        founder_id: row.get(17)?,
        created_at: row.get(18)?,
        founder,
    })
}

fn participant(row: &Row, name_idx: usize) -> rusqlite::Result<Option<Participant>> {
    let name: Option<String> = row.get(name_idx)?;
    let role: Option<String> = row.get(name_idx + 1)?;
    match (name, role) {
        (Some(name), Some(role)) => Ok(Some(Participant {
            name,
            role: parse_column::<Role>(name_idx + 1, role)?,
        })),
        _ => Ok(None),
    }
}

fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        idea_id: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        sender: participant(row, 6)?,
        receiver: participant(row, 8)?,
        idea_title: row.get(10)?,
    })
}

/// Maps a failed write. Only UNIQUE and PRIMARY KEY clashes become
/// `Duplicate`; NOT NULL or CHECK failures stay database errors.
fn write_error(context: &str, e: rusqlite::Error) -> VaultError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
        {
            VaultError::Duplicate(format!("{}: {}", context, e))
        }
        _ => VaultError::DatabaseError(format!("Failed to {}: {}", context, e)),
    }
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, VaultError> {
        let conn = Connection::open(path)
            .map_err(|e| VaultError::DatabaseError(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, VaultError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| VaultError::DatabaseError(format!("Failed to open database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, VaultError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                company TEXT,
                location TEXT,
                bio TEXT,
                linkedin_url TEXT,
                wallet_address TEXT,
                is_verified INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS ideas (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                stage TEXT NOT NULL,
                location TEXT,
                funding_goal REAL,
                team_size INTEGER,
                visibility TEXT NOT NULL DEFAULT 'PUBLIC',
                idea_hash TEXT NOT NULL,
                txn_id TEXT NOT NULL,
                app_id TEXT NOT NULL,
                block_timestamp INTEGER NOT NULL,
                content_cid TEXT NOT NULL,
                pitch_deck_cid TEXT,
                registered_at TEXT NOT NULL,
                is_verified INTEGER NOT NULL DEFAULT 0,
                founder_id TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ideas_hash ON ideas(idea_hash);
            CREATE INDEX IF NOT EXISTS idx_ideas_founder ON ideas(founder_id);
            CREATE TABLE IF NOT EXISTS shortlists (
                investor_id TEXT NOT NULL REFERENCES users(id),
                idea_id TEXT NOT NULL REFERENCES ideas(id),
                note TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (investor_id, idea_id)
            );
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                idea_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_idea ON messages(idea_id);",
        )
        .map_err(|e| VaultError::DatabaseError(format!("Failed to create schema: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, VaultError> {
        self.conn
            .lock()
            .map_err(|_| VaultError::DatabaseError("Mutex poisoned".to_string()))
    }

    fn query_ideas(&self, sql: &str, values: Vec<SqlValue>) -> Result<Vec<IdeaRecord>, VaultError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| VaultError::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params_from_iter(values), idea_from_row)
            .map_err(|e| VaultError::DatabaseError(format!("Failed to query ideas: {}", e)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| VaultError::DatabaseError(format!("Failed to read idea row: {}", e)))
    }

    fn query_messages(&self, sql: &str, values: Vec<SqlValue>) -> Result<Vec<Message>, VaultError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| VaultError::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params_from_iter(values), message_from_row)
            .map_err(|e| VaultError::DatabaseError(format!("Failed to query messages: {}", e)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| VaultError::DatabaseError(format!("Failed to read message row: {}", e)))
    }

    fn find_user(&self, column: &str, value: &str) -> Result<Option<User>, VaultError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column),
            params![value],
            user_from_row,
        )
        .optional()
        .map_err(|e| VaultError::DatabaseError(format!("Failed to load user: {}", e)))
    }
}

impl Persistence for Database {
    fn create_user(&self, user: NewUser) -> Result<User, VaultError> {
        let record = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            company: user.company,
            location: user.location,
            bio: None,
            linkedin_url: None,
            wallet_address: None,
            is_verified: false,
            created_at: crate::models::now_timestamp(),
        };

        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                USER_COLUMNS
            ),
            params![
                record.id,
                record.name,
                record.email,
                record.password_hash,
                record.role.as_str(),
                record.company,
                record.location,
                record.bio,
                record.linkedin_url,
                record.wallet_address,
                record.is_verified,
                record.created_at,
            ],
        )
        .map_err(|e| write_error("create user", e))?;

        Ok(record)
    }

    fn find_user_by_id(&self, id: &str) -> Result<Option<User>, VaultError> {
        self.find_user("id", id)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, VaultError> {
        self.find_user("email", email)
    }

    fn update_wallet(&self, user_id: &str, wallet_address: &str) -> Result<(), VaultError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE users SET wallet_address = ?1 WHERE id = ?2",
                params![wallet_address, user_id],
            )
            .map_err(|e| write_error("update wallet", e))?;
        if changed == 0 {
            return Err(VaultError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    fn insert_idea(&self, idea: &IdeaRecord) -> Result<(), VaultError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO ideas (id, title, description, category, stage, location, funding_goal,
                team_size, visibility, idea_hash, txn_id, app_id, block_timestamp, content_cid,
                pitch_deck_cid, registered_at, is_verified, founder_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                idea.id,
                idea.title,
                idea.description,
                idea.category.as_str(),
                idea.stage.as_str(),
                idea.location,
                idea.funding_goal,
                idea.team_size,
                idea.visibility.as_str(),
                idea.idea_hash,
                idea.txn_id,
                idea.app_id,
                idea.block_timestamp as i64,
                idea.content_cid,
                idea.pitch_deck_cid,
                idea.registered_at,
                idea.is_verified,
                idea.founder_id,
                idea.created_at,
            ],
        )
        .map_err(|e| write_error("insert idea", e))?;
        Ok(())
    }

    fn find_idea(&self, id: &str) -> Result<Option<IdeaRecord>, VaultError> {
        let sql = format!("{} WHERE i.id = ?", IDEA_SELECT);
        Ok(self
            .query_ideas(&sql, vec![SqlValue::Text(id.to_string())])?
            .into_iter()
            .next())
    }

    fn find_idea_by_hash(&self, idea_hash: &str) -> Result<Option<IdeaRecord>, VaultError> {
        let sql = format!("{} WHERE i.idea_hash = ?", IDEA_SELECT);
        Ok(self
            .query_ideas(&sql, vec![SqlValue::Text(idea_hash.to_string())])?
            .into_iter()
            .next())
    }

    fn list_ideas(&self, filter: &IdeaFilter, offset: u64, limit: u64) -> Result<Vec<IdeaRecord>, VaultError> {
        let (clause, mut values) = filter.where_clause();
        let sql = format!(
            "{} {} ORDER BY i.created_at DESC, i.rowid DESC LIMIT ? OFFSET ?",
            IDEA_SELECT, clause
        );
        values.push(SqlValue::Integer(limit as i64));
        values.push(SqlValue::Integer(offset as i64));
        self.query_ideas(&sql, values)
    }

    fn count_ideas(&self, filter: &IdeaFilter) -> Result<u64, VaultError> {
        let (clause, values) = filter.where_clause();
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM ideas i {}", clause),
                params_from_iter(values),
                |row| row.get(0),
            )
            .map_err(|e| VaultError::DatabaseError(format!("Failed to count ideas: {}", e)))?;
        Ok(count as u64)
    }

    fn count_all_ideas(&self, verified_only: bool) -> Result<u64, VaultError> {
        let sql = if verified_only {
            "SELECT COUNT(*) FROM ideas WHERE is_verified = 1"
        } else {
            "SELECT COUNT(*) FROM ideas"
        };
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| VaultError::DatabaseError(format!("Failed to count ideas: {}", e)))?;
        Ok(count as u64)
    }

    fn set_idea_verified(&self, id: &str, verified: bool) -> Result<(), VaultError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE ideas SET is_verified = ?1 WHERE id = ?2",
            params![verified, id],
        )
        .map_err(|e| write_error("update idea verification", e))?;
        Ok(())
    }

    fn upsert_shortlist(&self, investor_id: &str, idea_id: &str, note: Option<&str>) -> Result<ShortlistEntry, VaultError> {
        let now = crate::models::now_timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO shortlists (investor_id, idea_id, note, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(investor_id, idea_id)
             DO UPDATE SET note = excluded.note, updated_at = excluded.updated_at",
            params![investor_id, idea_id, note, now],
        )
        .map_err(|e| write_error("upsert shortlist", e))?;

        conn.query_row(
            "SELECT s.investor_id, s.idea_id, s.note, s.created_at, s.updated_at, i.title
             FROM shortlists s LEFT JOIN ideas i ON i.id = s.idea_id
             WHERE s.investor_id = ?1 AND s.idea_id = ?2",
            params![investor_id, idea_id],
            shortlist_from_row,
        )
        .map_err(|e| VaultError::DatabaseError(format!("Failed to load shortlist: {}", e)))
    }

    fn list_shortlist(&self, investor_id: &str) -> Result<Vec<ShortlistEntry>, VaultError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT s.investor_id, s.idea_id, s.note, s.created_at, s.updated_at, i.title
                 FROM shortlists s LEFT JOIN ideas i ON i.id = s.idea_id
                 WHERE s.investor_id = ?1
                 ORDER BY s.updated_at DESC",
            )
            .map_err(|e| VaultError::DatabaseError(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params![investor_id], shortlist_from_row)
            .map_err(|e| VaultError::DatabaseError(format!("Failed to query shortlist: {}", e)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| VaultError::DatabaseError(format!("Failed to read shortlist row: {}", e)))
    }

    fn insert_message(&self, message: &Message) -> Result<(), VaultError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, idea_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.sender_id,
                message.receiver_id,
                message.idea_id,
                message.content,
                message.created_at,
            ],
        )
        .map_err(|e| write_error("insert message", e))?;
        Ok(())
    }

    fn conversation(&self, idea_id: &str, user_id: &str) -> Result<Vec<Message>, VaultError> {
        let sql = format!(
            "{} WHERE m.idea_id = ? AND (m.sender_id = ? OR m.receiver_id = ?)
             ORDER BY m.created_at ASC, m.rowid ASC",
            MESSAGE_SELECT
        );
        let user = SqlValue::Text(user_id.to_string());
        self.query_messages(&sql, vec![SqlValue::Text(idea_id.to_string()), user.clone(), user])
    }

    fn inbox(&self, user_id: &str) -> Result<Vec<Message>, VaultError> {
        let sql = format!(
            "{} WHERE m.rowid = (
                SELECT m2.rowid FROM messages m2
                WHERE m2.idea_id = m.idea_id AND (m2.sender_id = ?1 OR m2.receiver_id = ?1)
                ORDER BY m2.created_at DESC, m2.rowid DESC LIMIT 1
             )
             ORDER BY m.created_at DESC, m.rowid DESC",
            MESSAGE_SELECT
        );
        self.query_messages(&sql, vec![SqlValue::Text(user_id.to_string())])
    }
}

fn shortlist_from_row(row: &Row) -> rusqlite::Result<ShortlistEntry> {
    Ok(ShortlistEntry {
        investor_id: row.get(0)?,
        idea_id: row.get(1)?,
        note: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        idea_title: row.get(5)?,
    })
}
