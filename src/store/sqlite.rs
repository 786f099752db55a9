use anyhow::{Context, Result, bail};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::{CatalogStore, InteractionStore, schema};
use crate::catalog::{CatalogEntry, Fields, Item, ItemId, ItemMetadata, ItemSummary, UserId};
use crate::embed::{EmbeddedText, Embedding};

const DB_FILE: &str = "catalog.db";

pub struct Store {
    conn: Connection,
}

/// What an item's stored vector was computed from, next to its current metadata.
pub struct EmbeddingState {
    pub id: ItemId,
    pub metadata: ItemMetadata,
    pub embedded_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub item_count: i64,
    pub embedded_count: i64,
    pub like_count: i64,
    pub user_count: i64,
    pub dimensions: Option<usize>,
    pub models: Vec<(String, i64)>,
}

impl Store {
    pub fn open(storage_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(storage_dir)
            .with_context(|| format!("creating storage dir {}", storage_dir.display()))?;
        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening database at {}", db_path.display()))?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open only if a database already exists, for read-only commands.
    pub fn open_if_exists(storage_dir: &Path) -> Result<Option<Self>> {
        if storage_dir.join(DB_FILE).exists() {
            Self::open(storage_dir).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Dimension shared by every stored vector, if any vector exists.
    pub fn vector_dimensions(&self) -> Result<Option<usize>> {
        let dims: Option<i64> = self
            .conn
            .query_row(
                "SELECT dimensions FROM items WHERE dimensions IS NOT NULL LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?;
        Ok(dims.map(|d| d as usize))
    }

    fn check_dimensions(&self, id: ItemId, vector: &[f32]) -> Result<()> {
        // An item re-embedded by a different model may legitimately change D
        // only when it is the sole embedded item.
        let other: Option<i64> = self
            .conn
            .query_row(
                "SELECT dimensions FROM items WHERE dimensions IS NOT NULL AND id != ?1 LIMIT 1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(expected) = other {
            if expected as usize != vector.len() {
                bail!(
                    "vector for {id} has {} dimensions but the catalog uses {expected}",
                    vector.len()
                );
            }
        }
        Ok(())
    }

    /// Insert a new item, with its vector when one was computed.
    pub fn insert_item(
        &self,
        id: ItemId,
        meta: &ItemMetadata,
        embedded: Option<&EmbeddedText>,
    ) -> Result<()> {
        if let Some(e) = embedded {
            self.check_dimensions(id, &e.vector)?;
        }
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO items (id, title, description, genres, tags, release_year, director, actors,
                                vector, dimensions, embedded_model, embedded_hash, embedded_at,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            params![
                id,
                meta.title,
                meta.description,
                serde_json::to_string(&meta.genres)?,
                serde_json::to_string(&meta.tags)?,
                meta.release_year,
                meta.director,
                serde_json::to_string(&meta.actors)?,
                embedded.map(|e| encode_vector(&e.vector)),
                embedded.map(|e| e.vector.len() as i64),
                embedded.map(|e| e.model.as_str()),
                embedded.map(|e| e.text_hash.as_str()),
                embedded.map(|_| now.as_str()),
                now,
            ],
        )?;
        Ok(())
    }

    /// Replace an item's metadata. The stored vector is left untouched.
    /// Returns false if the item does not exist.
    pub fn update_metadata(&self, id: ItemId, meta: &ItemMetadata) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE items SET title = ?2, description = ?3, genres = ?4, tags = ?5,
                              release_year = ?6, director = ?7, actors = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                id,
                meta.title,
                meta.description,
                serde_json::to_string(&meta.genres)?,
                serde_json::to_string(&meta.tags)?,
                meta.release_year,
                meta.director,
                serde_json::to_string(&meta.actors)?,
                now,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_embedding(&self, id: ItemId, embedded: &EmbeddedText) -> Result<()> {
        self.check_dimensions(id, &embedded.vector)?;
        let now = chrono::Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE items SET vector = ?2, dimensions = ?3, embedded_model = ?4,
                              embedded_hash = ?5, embedded_at = ?6
             WHERE id = ?1",
            params![
                id,
                encode_vector(&embedded.vector),
                embedded.vector.len() as i64,
                embedded.model,
                embedded.text_hash,
                now,
            ],
        )?;
        if changed == 0 {
            bail!("item {id} not found");
        }
        Ok(())
    }

    pub fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        let item = self
            .conn
            .query_row(
                "SELECT id, title, description, genres, tags, release_year, director, actors,
                        embedded_model, embedded_at, created_at, updated_at
                 FROM items WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Item {
                        id: row.get(0)?,
                        metadata: metadata_from_row(row, 1)?,
                        embedded_model: row.get(8)?,
                        embedded_at: row.get(9)?,
                        created_at: row.get(10)?,
                        updated_at: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    /// Lightweight lookup of every item, ordered by title.
    pub fn list_items(&self) -> Result<Vec<ItemSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, release_year FROM items ORDER BY title, id")?;
        let rows = stmt.query_map([], summary_from_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Delete an item; its likes go with it. Returns false if it did not exist.
    pub fn remove_item(&self, id: ItemId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn embedding_states(&self) -> Result<Vec<EmbeddingState>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, description, genres, tags, release_year, director, actors,
                    embedded_hash
             FROM items ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EmbeddingState {
                id: row.get(0)?,
                metadata: metadata_from_row(row, 1)?,
                embedded_hash: row.get(8)?,
            })
        })?;
        let mut states = Vec::new();
        for row in rows {
            states.push(row?);
        }
        Ok(states)
    }

    pub fn add_like(&self, user: UserId, item: ItemId) -> Result<()> {
        if self.get_item(item)?.is_none() {
            bail!("item {item} not found");
        }
        let now = chrono::Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO likes (user_id, item_id, liked_at) VALUES (?1, ?2, ?3)",
            params![user, item, now],
        )?;
        if inserted == 0 {
            bail!("user {user} already likes {item}");
        }
        Ok(())
    }

    pub fn remove_like(&self, user: UserId, item: ItemId) -> Result<()> {
        let removed = self.conn.execute(
            "DELETE FROM likes WHERE user_id = ?1 AND item_id = ?2",
            params![user, item],
        )?;
        if removed == 0 {
            bail!("user {user} does not like {item}");
        }
        Ok(())
    }

    pub fn likes_for_user(&self, user: UserId) -> Result<Vec<ItemId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT item_id FROM likes WHERE user_id = ?1 ORDER BY liked_at, item_id")?;
        let rows = stmt.query_map(params![user], |r| r.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Replace a user's liked set in one transaction.
    pub fn replace_likes(&self, user: UserId, items: &[ItemId]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM likes WHERE user_id = ?1", params![user])?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO likes (user_id, item_id, liked_at) VALUES (?1, ?2, ?3)",
            )?;
            for item in items {
                stmt.execute(params![user, item, now])
                    .with_context(|| format!("liking {item}"))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let item_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))?;
        let embedded_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE vector IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let like_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM likes", [], |r| r.get(0))?;
        let user_count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM likes",
            [],
            |r| r.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT embedded_model, COUNT(*) FROM items WHERE embedded_model IS NOT NULL
             GROUP BY embedded_model ORDER BY COUNT(*) DESC",
        )?;
        let models = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;

        Ok(CatalogStats {
            item_count,
            embedded_count,
            like_count,
            user_count,
            dimensions: self.vector_dimensions()?,
            models,
        })
    }
}

impl CatalogStore for Store {
    fn fetch_vectors(&self, ids: &[ItemId]) -> Result<HashMap<ItemId, Option<Embedding>>> {
        let mut stmt = self.conn.prepare("SELECT vector FROM items WHERE id = ?1")?;
        let mut vectors = HashMap::with_capacity(ids.len());
        for id in ids {
            let blob: Option<Option<Vec<u8>>> = stmt
                .query_row(params![id], |r| r.get(0))
                .optional()?;
            if let Some(blob) = blob {
                vectors.insert(*id, blob.map(|b| decode_vector(&b)).transpose()?);
            }
        }
        Ok(vectors)
    }

    fn fetch_items(
        &self,
        excluding: &HashSet<ItemId>,
        fields: Fields,
    ) -> Result<Vec<CatalogEntry>> {
        let sql = match fields {
            Fields::Summary => "SELECT id, title, release_year FROM items",
            Fields::WithVector => "SELECT id, title, release_year, vector FROM items",
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            let summary = summary_from_row(row)?;
            let blob: Option<Vec<u8>> = match fields {
                Fields::Summary => None,
                Fields::WithVector => row.get(3)?,
            };
            Ok((summary, blob))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (summary, blob) = row?;
            if excluding.contains(&summary.id) {
                continue;
            }
            let vector = blob.map(|b| decode_vector(&b)).transpose()?;
            entries.push(CatalogEntry { summary, vector });
        }
        Ok(entries)
    }
}

impl InteractionStore for Store {
    fn count_likes_by_item(&self, excluding: &HashSet<ItemId>) -> Result<HashMap<ItemId, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT item_id, COUNT(DISTINCT user_id) FROM likes GROUP BY item_id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, ItemId>(0)?, row.get::<_, i64>(1)?)))?;
        let mut counts = HashMap::new();
        for row in rows {
            let (id, count) = row?;
            if !excluding.contains(&id) {
                counts.insert(id, count as u64);
            }
        }
        Ok(counts)
    }

    fn users_who_liked(&self, ids: &[ItemId]) -> Result<HashSet<UserId>> {
        let mut stmt = self.conn.prepare("SELECT user_id FROM likes WHERE item_id = ?1")?;
        let mut users = HashSet::new();
        for id in ids {
            let rows = stmt.query_map(params![id], |r| r.get::<_, UserId>(0))?;
            for row in rows {
                users.insert(row?);
            }
        }
        Ok(users)
    }

    fn items_liked_by(
        &self,
        users: &HashSet<UserId>,
        excluding: &HashSet<ItemId>,
    ) -> Result<HashMap<ItemId, u64>> {
        let mut stmt = self.conn.prepare("SELECT item_id FROM likes WHERE user_id = ?1")?;
        let mut counts: HashMap<ItemId, u64> = HashMap::new();
        for user in users {
            let rows = stmt.query_map(params![user], |r| r.get::<_, ItemId>(0))?;
            for row in rows {
                let id = row?;
                if !excluding.contains(&id) {
                    *counts.entry(id).or_insert(0) += 1;
                }
            }
        }
        Ok(counts)
    }

    fn interaction_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM likes", [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<ItemSummary> {
    Ok(ItemSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        release_year: row.get(2)?,
    })
}

/// Reads the seven metadata columns starting at `start`, in table order.
fn metadata_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<ItemMetadata> {
    Ok(ItemMetadata {
        title: row.get(start)?,
        description: row.get(start + 1)?,
        genres: json_list(row, start + 2)?,
        tags: json_list(row, start + 3)?,
        release_year: row.get(start + 4)?,
        director: row.get(start + 5)?,
        actors: json_list(row, start + 6)?,
    })
}

fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Result<Embedding> {
    if blob.len() % 4 != 0 {
        bail!("corrupt vector blob of {} bytes", blob.len());
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

macro_rules! sql_text_id {
    ($name:ty) => {
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.to_string()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

sql_text_id!(ItemId);
sql_text_id!(UserId);
