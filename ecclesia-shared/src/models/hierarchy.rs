/// Ecclesiastical hierarchy: province → diocese → archdeaconry → deanery → parish
///
/// Provinces and dioceses are compiled-in reference data (see [`CATALOG`]).
/// They are mirrored into the `provinces` / `dioceses` tables the first time
/// a registration references them. Archdeaconries, deaneries and parishes
/// are free-form names scoped to their parent and created on first use.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE provinces (id UUID PRIMARY KEY, code VARCHAR(64) UNIQUE, name VARCHAR(255));
/// CREATE TABLE dioceses (id UUID PRIMARY KEY, province_id UUID, code VARCHAR(64) UNIQUE, name VARCHAR(255));
/// CREATE TABLE archdeaconries (id UUID PRIMARY KEY, diocese_id UUID, name VARCHAR(255), UNIQUE (diocese_id, name));
/// CREATE TABLE deaneries (id UUID PRIMARY KEY, archdeaconry_id UUID, name VARCHAR(255), UNIQUE (archdeaconry_id, name));
/// CREATE TABLE parishes (id UUID PRIMARY KEY, deanery_id UUID, name VARCHAR(255), UNIQUE (deanery_id, name));
/// ```

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// A compiled-in province with its dioceses
#[derive(Debug, Clone, Copy)]
pub struct ProvinceEntry {
    pub code: &'static str,
    pub name: &'static str,
    pub dioceses: &'static [DioceseEntry],
}

/// A compiled-in diocese
#[derive(Debug, Clone, Copy)]
pub struct DioceseEntry {
    pub code: &'static str,
    pub name: &'static str,
}

/// Reference catalogue of provinces and dioceses
pub static CATALOG: &[ProvinceEntry] = &[
    ProvinceEntry {
        code: "lagos",
        name: "Province of Lagos",
        dioceses: &[
            DioceseEntry { code: "lagos", name: "Diocese of Lagos" },
            DioceseEntry { code: "lagos-west", name: "Diocese of Lagos West" },
            DioceseEntry { code: "lagos-mainland", name: "Diocese of Lagos Mainland" },
            DioceseEntry { code: "badagry", name: "Diocese of Badagry" },
            DioceseEntry { code: "egba", name: "Diocese of Egba" },
            DioceseEntry { code: "ijebu", name: "Diocese of Ijebu" },
            DioceseEntry { code: "remo", name: "Diocese of Remo" },
            DioceseEntry { code: "yewa", name: "Diocese of Yewa" },
        ],
    },
    ProvinceEntry {
        code: "ibadan",
        name: "Province of Ibadan",
        dioceses: &[
            DioceseEntry { code: "ibadan", name: "Diocese of Ibadan" },
            DioceseEntry { code: "ibadan-north", name: "Diocese of Ibadan North" },
            DioceseEntry { code: "ibadan-south", name: "Diocese of Ibadan South" },
            DioceseEntry { code: "oyo", name: "Diocese of Oyo" },
            DioceseEntry { code: "ogbomoso", name: "Diocese of Ogbomoso" },
            DioceseEntry { code: "ife", name: "Diocese of Ife" },
            DioceseEntry { code: "osun", name: "Diocese of Osun" },
        ],
    },
    ProvinceEntry {
        code: "ondo",
        name: "Province of Ondo",
        dioceses: &[
            DioceseEntry { code: "ondo", name: "Diocese of Ondo" },
            DioceseEntry { code: "akure", name: "Diocese of Akure" },
            DioceseEntry { code: "ekiti", name: "Diocese of Ekiti" },
            DioceseEntry { code: "owo", name: "Diocese of Owo" },
        ],
    },
    ProvinceEntry {
        code: "abuja",
        name: "Province of Abuja",
        dioceses: &[
            DioceseEntry { code: "abuja", name: "Diocese of Abuja" },
            DioceseEntry { code: "gwagwalada", name: "Diocese of Gwagwalada" },
            DioceseEntry { code: "kubwa", name: "Diocese of Kubwa" },
            DioceseEntry { code: "lafia", name: "Diocese of Lafia" },
        ],
    },
    ProvinceEntry {
        code: "enugu",
        name: "Province of Enugu",
        dioceses: &[
            DioceseEntry { code: "enugu", name: "Diocese of Enugu" },
            DioceseEntry { code: "nike", name: "Diocese of Nike" },
            DioceseEntry { code: "awgu-aninri", name: "Diocese of Awgu/Aninri" },
            DioceseEntry { code: "oji-river", name: "Diocese of Oji River" },
        ],
    },
    ProvinceEntry {
        code: "niger-delta",
        name: "Province of the Niger Delta",
        dioceses: &[
            DioceseEntry { code: "niger-delta", name: "Diocese of the Niger Delta" },
            DioceseEntry { code: "niger-delta-north", name: "Diocese of Niger Delta North" },
            DioceseEntry { code: "calabar", name: "Diocese of Calabar" },
            DioceseEntry { code: "uyo", name: "Diocese of Uyo" },
        ],
    },
];

/// Looks up a province in the catalogue by code
pub fn find_province(code: &str) -> Option<&'static ProvinceEntry> {
    CATALOG.iter().find(|p| p.code == code)
}

/// Looks up a diocese under a province in the catalogue
pub fn find_diocese(province_code: &str, diocese_code: &str) -> Option<&'static DioceseEntry> {
    find_province(province_code)?
        .dioceses
        .iter()
        .find(|d| d.code == diocese_code)
}

/// Hierarchy levels, from broadest to narrowest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Province,
    Diocese,
    Archdeaconry,
    Deanery,
    Parish,
}

impl HierarchyLevel {
    /// Parses a level from its lowercase name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "province" => Some(HierarchyLevel::Province),
            "diocese" => Some(HierarchyLevel::Diocese),
            "archdeaconry" => Some(HierarchyLevel::Archdeaconry),
            "deanery" => Some(HierarchyLevel::Deanery),
            "parish" => Some(HierarchyLevel::Parish),
            _ => None,
        }
    }

    /// The level directly below this one (None for parish)
    pub fn child(&self) -> Option<Self> {
        match self {
            HierarchyLevel::Province => Some(HierarchyLevel::Diocese),
            HierarchyLevel::Diocese => Some(HierarchyLevel::Archdeaconry),
            HierarchyLevel::Archdeaconry => Some(HierarchyLevel::Deanery),
            HierarchyLevel::Deanery => Some(HierarchyLevel::Parish),
            HierarchyLevel::Parish => None,
        }
    }

    /// Table holding rows of this level
    pub fn table(&self) -> &'static str {
        match self {
            HierarchyLevel::Province => "provinces",
            HierarchyLevel::Diocese => "dioceses",
            HierarchyLevel::Archdeaconry => "archdeaconries",
            HierarchyLevel::Deanery => "deaneries",
            HierarchyLevel::Parish => "parishes",
        }
    }

    /// Column on the child table referencing this level
    pub fn foreign_key(&self) -> &'static str {
        match self {
            HierarchyLevel::Province => "province_id",
            HierarchyLevel::Diocese => "diocese_id",
            HierarchyLevel::Archdeaconry => "archdeaconry_id",
            HierarchyLevel::Deanery => "deanery_id",
            HierarchyLevel::Parish => "parish_id",
        }
    }
}

/// Resolved hierarchy ids carried by a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyIds {
    pub province_id: Option<Uuid>,
    pub diocese_id: Option<Uuid>,
    pub archdeaconry_id: Option<Uuid>,
    pub deanery_id: Option<Uuid>,
    pub parish_id: Option<Uuid>,
}

impl HierarchyIds {
    /// Id at the given level
    pub fn at(&self, level: HierarchyLevel) -> Option<Uuid> {
        match level {
            HierarchyLevel::Province => self.province_id,
            HierarchyLevel::Diocese => self.diocese_id,
            HierarchyLevel::Archdeaconry => self.archdeaconry_id,
            HierarchyLevel::Deanery => self.deanery_id,
            HierarchyLevel::Parish => self.parish_id,
        }
    }
}

/// Hierarchy chosen on a registration form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchySelection {
    /// Catalogue province code
    pub province: String,
    /// Catalogue diocese code
    pub diocese: String,
    pub archdeaconry: Option<String>,
    pub deanery: Option<String>,
    pub parish: Option<String>,
}

/// Error resolving a hierarchy selection
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    #[error("Unknown province: {0}")]
    UnknownProvince(String),

    #[error("Unknown diocese {diocese} in province {province}")]
    UnknownDiocese { province: String, diocese: String },

    #[error("{child} requires {parent}")]
    MissingParent {
        child: &'static str,
        parent: &'static str,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A hierarchy node row (any level)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HierarchyNode {
    pub id: Uuid,
    pub name: String,
}

/// Namespace for hierarchy persistence operations
pub struct Hierarchy;

impl Hierarchy {
    /// Validates a selection against the catalogue and mirrors it into the database
    ///
    /// Runs on the caller's connection so registration can wrap user creation
    /// and hierarchy mirroring in one transaction. Blank lower-level names
    /// are treated as absent; a lower level without its parent is rejected.
    pub async fn ensure_chain(
        conn: &mut PgConnection,
        selection: &HierarchySelection,
    ) -> Result<HierarchyIds, HierarchyError> {
        let province = find_province(&selection.province)
            .ok_or_else(|| HierarchyError::UnknownProvince(selection.province.clone()))?;
        let diocese = find_diocese(&selection.province, &selection.diocese).ok_or_else(|| {
            HierarchyError::UnknownDiocese {
                province: selection.province.clone(),
                diocese: selection.diocese.clone(),
            }
        })?;

        let archdeaconry = non_blank(&selection.archdeaconry);
        let deanery = non_blank(&selection.deanery);
        let parish = non_blank(&selection.parish);

        if deanery.is_some() && archdeaconry.is_none() {
            return Err(HierarchyError::MissingParent {
                child: "deanery",
                parent: "archdeaconry",
            });
        }
        if parish.is_some() && deanery.is_none() {
            return Err(HierarchyError::MissingParent {
                child: "parish",
                parent: "deanery",
            });
        }

        let province_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO provinces (code, name) VALUES ($1, $2)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(province.code)
        .bind(province.name)
        .fetch_one(&mut *conn)
        .await?;

        let diocese_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO dioceses (province_id, code, name) VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(province_id)
        .bind(diocese.code)
        .bind(diocese.name)
        .fetch_one(&mut *conn)
        .await?;

        let mut ids = HierarchyIds {
            province_id: Some(province_id),
            diocese_id: Some(diocese_id),
            ..Default::default()
        };

        if let Some(name) = archdeaconry {
            ids.archdeaconry_id = Some(
                upsert_named(conn, HierarchyLevel::Archdeaconry, diocese_id, name).await?,
            );
        }
        if let (Some(name), Some(parent)) = (deanery, ids.archdeaconry_id) {
            ids.deanery_id = Some(upsert_named(conn, HierarchyLevel::Deanery, parent, name).await?);
        }
        if let (Some(name), Some(parent)) = (parish, ids.deanery_id) {
            ids.parish_id = Some(upsert_named(conn, HierarchyLevel::Parish, parent, name).await?);
        }

        Ok(ids)
    }

    /// Lists the mirrored children of a node
    ///
    /// Returns an empty list for parishes (no children).
    pub async fn children(
        pool: &PgPool,
        level: HierarchyLevel,
        parent_id: Uuid,
    ) -> Result<Vec<HierarchyNode>, sqlx::Error> {
        let Some(child) = level.child() else {
            return Ok(Vec::new());
        };

        let query = format!(
            "SELECT id, name FROM {} WHERE {} = $1 ORDER BY name",
            child.table(),
            level.foreign_key()
        );

        sqlx::query_as::<_, HierarchyNode>(&query)
            .bind(parent_id)
            .fetch_all(pool)
            .await
    }

    /// Finds the display name of a node
    pub async fn name_of(
        pool: &PgPool,
        level: HierarchyLevel,
        id: Uuid,
    ) -> Result<Option<String>, sqlx::Error> {
        let query = format!("SELECT name FROM {} WHERE id = $1", level.table());
        sqlx::query_scalar(&query).bind(id).fetch_optional(pool).await
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

async fn upsert_named(
    conn: &mut PgConnection,
    level: HierarchyLevel,
    parent_id: Uuid,
    name: &str,
) -> Result<Uuid, sqlx::Error> {
    let parent_column = match level {
        HierarchyLevel::Archdeaconry => "diocese_id",
        HierarchyLevel::Deanery => "archdeaconry_id",
        HierarchyLevel::Parish => "deanery_id",
        HierarchyLevel::Province | HierarchyLevel::Diocese => {
            return Err(sqlx::Error::Protocol(format!(
                "{} rows come from the catalogue",
                level.table()
            )))
        }
    };

    // The no-op update makes RETURNING yield the existing row on conflict
    let query = format!(
        "INSERT INTO {table} ({parent}, name) VALUES ($1, $2)
         ON CONFLICT ({parent}, name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id",
        table = level.table(),
        parent = parent_column,
    );

    sqlx::query_scalar(&query)
        .bind(parent_id)
        .bind(name)
        .fetch_one(conn)
        .await
}
