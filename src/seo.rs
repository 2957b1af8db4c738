//! Search metadata: site-wide defaults, per-page overrides, and the field-by-field merge.

use crate::error::AppError;
use crate::store::{system_table, PAGE_SEO_TABLE, SEO_DEFAULTS_TABLE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

pub const DEFAULTS_ID: &str = "global";
pub const TITLE_PLACEHOLDER: &str = "%s";
pub const NOINDEX: &str = "noindex, nofollow";
const DEFAULT_ROBOTS: &str = "index, follow";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct SeoDefaults {
    pub site_name: String,
    /// `%s` is replaced by the page title, e.g. `%s | Acme Modular`.
    pub title_template: String,
    pub default_title: String,
    pub default_description: String,
    #[sqlx(json)]
    pub default_keywords: Vec<String>,
    pub default_og_image: Option<String>,
    pub canonical_base_url: String,
    pub twitter_handle: Option<String>,
    pub robots: String,
    #[serde(skip_deserializing)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for SeoDefaults {
    fn default() -> Self {
        SeoDefaults {
            site_name: String::new(),
            title_template: TITLE_PLACEHOLDER.into(),
            default_title: String::new(),
            default_description: String::new(),
            default_keywords: Vec::new(),
            default_og_image: None,
            canonical_base_url: String::new(),
            twitter_handle: None,
            robots: DEFAULT_ROBOTS.into(),
            updated_at: None,
        }
    }
}

/// Stored override for one page path.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PageSeo {
    pub id: uuid::Uuid,
    pub page_path: String,
    pub title: Option<String>,
    /// Use `title` verbatim instead of rendering it through the template.
    pub title_is_absolute: bool,
    pub description: Option<String>,
    #[sqlx(json)]
    pub keywords: Vec<String>,
    pub og_image: Option<String>,
    pub canonical_url: Option<String>,
    pub robots: Option<String>,
    pub no_index: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `PUT /admin/seo/pages`. Absent fields clear the override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageSeoInput {
    pub page_path: String,
    pub title: Option<String>,
    pub title_is_absolute: bool,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub og_image: Option<String>,
    pub canonical_url: Option<String>,
    pub robots: Option<String>,
    pub no_index: Option<bool>,
}

/// What a page should render in its head.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveSeo {
    pub page_path: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub og_image: Option<String>,
    pub canonical_url: String,
    pub robots: String,
    pub site_name: String,
    pub twitter_handle: Option<String>,
}

fn non_blank(s: Option<&String>) -> Option<&str> {
    s.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Substitutes the first `%s`; a template without the placeholder leaves the title alone.
pub fn render_title(template: &str, title: &str) -> String {
    if template.contains(TITLE_PLACEHOLDER) {
        template.replacen(TITLE_PLACEHOLDER, title, 1)
    } else {
        title.to_string()
    }
}

/// `/about/`, `about`, `/about?x=1` all become `/about`. The root stays `/`.
pub fn normalize_path(raw: &str) -> Result<String, AppError> {
    let path = raw.split(['?', '#']).next().unwrap_or("").trim();
    if path.chars().any(char::is_whitespace) || path.contains("://") {
        return Err(AppError::BadRequest(format!("invalid page path '{}'", raw)));
    }
    let trimmed = path.trim_matches('/');
    Ok(format!("/{}", trimmed))
}

/// Each field takes the page override when it is present and non-blank, otherwise the site default.
pub fn merge_seo(defaults: &SeoDefaults, page: Option<&PageSeo>, page_path: &str) -> EffectiveSeo {
    let title = match page.and_then(|p| non_blank(p.title.as_ref()).map(|t| (t, p.title_is_absolute))) {
        Some((t, true)) => t.to_string(),
        Some((t, false)) => render_title(&defaults.title_template, t),
        None if !defaults.default_title.trim().is_empty() => defaults.default_title.clone(),
        None => defaults.site_name.clone(),
    };
    let description = page
        .and_then(|p| non_blank(p.description.as_ref()))
        .map(str::to_string)
        .unwrap_or_else(|| defaults.default_description.clone());
    let keywords = match page {
        Some(p) if !p.keywords.is_empty() => p.keywords.clone(),
        _ => defaults.default_keywords.clone(),
    };
    let og_image = page
        .and_then(|p| non_blank(p.og_image.as_ref()))
        .map(str::to_string)
        .or_else(|| defaults.default_og_image.clone());
    let canonical_url = page
        .and_then(|p| non_blank(p.canonical_url.as_ref()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}{}", defaults.canonical_base_url.trim_end_matches('/'), page_path));
    let robots = match page {
        Some(p) if p.no_index == Some(true) => NOINDEX.to_string(),
        Some(p) => non_blank(p.robots.as_ref())
            .map(str::to_string)
            .unwrap_or_else(|| defaults.robots.clone()),
        None => defaults.robots.clone(),
    };
    EffectiveSeo {
        page_path: page_path.to_string(),
        title,
        description,
        keywords,
        og_image,
        canonical_url,
        robots,
        site_name: defaults.site_name.clone(),
        twitter_handle: defaults.twitter_handle.clone(),
    }
}

const DEFAULTS_COLUMNS: &str = "site_name, title_template, default_title, default_description, default_keywords, \
     default_og_image, canonical_base_url, twitter_handle, robots, updated_at";
const PAGE_COLUMNS: &str =
    "id, page_path, title, title_is_absolute, description, keywords, og_image, canonical_url, robots, no_index, updated_at";

/// Stored defaults, or built-in ones when none were saved yet.
pub async fn get_defaults(pool: &PgPool, schema: &str) -> Result<SeoDefaults, AppError> {
    let row = sqlx::query_as::<_, SeoDefaults>(&format!(
        "SELECT {} FROM {} WHERE id = $1",
        DEFAULTS_COLUMNS,
        system_table(schema, SEO_DEFAULTS_TABLE)
    ))
    .bind(DEFAULTS_ID)
    .fetch_optional(pool)
    .await?;
    Ok(row.unwrap_or_default())
}

pub async fn put_defaults(pool: &PgPool, schema: &str, d: &SeoDefaults) -> Result<SeoDefaults, AppError> {
    if !d.title_template.contains(TITLE_PLACEHOLDER) {
        return Err(AppError::Validation(format!("title_template must contain '{}'", TITLE_PLACEHOLDER)));
    }
    let row = sqlx::query_as::<_, SeoDefaults>(&format!(
        "INSERT INTO {table} (id, site_name, title_template, default_title, default_description, default_keywords,
             default_og_image, canonical_base_url, twitter_handle, robots, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
         ON CONFLICT (id) DO UPDATE SET
             site_name = EXCLUDED.site_name, title_template = EXCLUDED.title_template,
             default_title = EXCLUDED.default_title, default_description = EXCLUDED.default_description,
             default_keywords = EXCLUDED.default_keywords, default_og_image = EXCLUDED.default_og_image,
             canonical_base_url = EXCLUDED.canonical_base_url, twitter_handle = EXCLUDED.twitter_handle,
             robots = EXCLUDED.robots, updated_at = NOW()
         RETURNING {cols}",
        table = system_table(schema, SEO_DEFAULTS_TABLE),
        cols = DEFAULTS_COLUMNS
    ))
    .bind(DEFAULTS_ID)
    .bind(&d.site_name)
    .bind(&d.title_template)
    .bind(&d.default_title)
    .bind(&d.default_description)
    .bind(serde_json::json!(d.default_keywords))
    .bind(&d.default_og_image)
    .bind(&d.canonical_base_url)
    .bind(&d.twitter_handle)
    .bind(&d.robots)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_page(pool: &PgPool, schema: &str, page_path: &str) -> Result<Option<PageSeo>, AppError> {
    let row = sqlx::query_as::<_, PageSeo>(&format!(
        "SELECT {} FROM {} WHERE page_path = $1",
        PAGE_COLUMNS,
        system_table(schema, PAGE_SEO_TABLE)
    ))
    .bind(page_path)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_pages(pool: &PgPool, schema: &str) -> Result<Vec<PageSeo>, AppError> {
    let rows = sqlx::query_as::<_, PageSeo>(&format!(
        "SELECT {} FROM {} ORDER BY page_path",
        PAGE_COLUMNS,
        system_table(schema, PAGE_SEO_TABLE)
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Insert or replace the override for `input.page_path` (normalized first).
pub async fn upsert_page(pool: &PgPool, schema: &str, input: PageSeoInput) -> Result<PageSeo, AppError> {
    if input.page_path.trim().is_empty() {
        return Err(AppError::Validation("page_path is required".into()));
    }
    let page_path = normalize_path(&input.page_path)?;
    let row = sqlx::query_as::<_, PageSeo>(&format!(
        "INSERT INTO {table} (id, page_path, title, title_is_absolute, description, keywords, og_image,
             canonical_url, robots, no_index, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
         ON CONFLICT (page_path) DO UPDATE SET
             title = EXCLUDED.title, title_is_absolute = EXCLUDED.title_is_absolute,
             description = EXCLUDED.description, keywords = EXCLUDED.keywords, og_image = EXCLUDED.og_image,
             canonical_url = EXCLUDED.canonical_url, robots = EXCLUDED.robots, no_index = EXCLUDED.no_index,
             updated_at = NOW()
         RETURNING {cols}",
        table = system_table(schema, PAGE_SEO_TABLE),
        cols = PAGE_COLUMNS
    ))
    .bind(uuid::Uuid::new_v4())
    .bind(&page_path)
    .bind(&input.title)
    .bind(input.title_is_absolute)
    .bind(&input.description)
    .bind(serde_json::json!(input.keywords))
    .bind(&input.og_image)
    .bind(&input.canonical_url)
    .bind(&input.robots)
    .bind(input.no_index)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn delete_page(pool: &PgPool, schema: &str, id: uuid::Uuid) -> Result<bool, AppError> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", system_table(schema, PAGE_SEO_TABLE)))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Defaults plus the override for `raw_path`, merged.
pub async fn effective_for_path(pool: &PgPool, schema: &str, raw_path: &str) -> Result<EffectiveSeo, AppError> {
    let path = normalize_path(raw_path)?;
    let defaults = get_defaults(pool, schema).await?;
    let page = get_page(pool, schema, &path).await?;
    Ok(merge_seo(&defaults, page.as_ref(), &path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> SeoDefaults {
        SeoDefaults {
            site_name: "Acme Modular".into(),
            title_template: "%s | Acme Modular".into(),
            default_title: "Acme Modular | Modular Building Rentals".into(),
            default_description: "Modular offices, classrooms and storage for rent.".into(),
            default_keywords: vec!["modular buildings".into(), "portable offices".into()],
            default_og_image: Some("/og/default.jpg".into()),
            canonical_base_url: "https://www.acme-modular.example/".into(),
            twitter_handle: Some("@acmemodular".into()),
            robots: "index, follow".into(),
            updated_at: None,
        }
    }

    fn page(path: &str) -> PageSeo {
        PageSeo {
            id: uuid::Uuid::nil(),
            page_path: path.into(),
            title: None,
            title_is_absolute: false,
            description: None,
            keywords: Vec::new(),
            og_image: None,
            canonical_url: None,
            robots: None,
            no_index: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn without_override_everything_is_default() {
        let seo = merge_seo(&defaults(), None, "/solutions");
        assert_eq!(seo.title, "Acme Modular | Modular Building Rentals");
        assert_eq!(seo.description, "Modular offices, classrooms and storage for rent.");
        assert_eq!(seo.canonical_url, "https://www.acme-modular.example/solutions");
        assert_eq!(seo.robots, "index, follow");
        assert_eq!(seo.keywords.len(), 2);
    }

    #[test]
    fn override_title_goes_through_template() {
        let mut p = page("/solutions");
        p.title = Some("Solutions".into());
        assert_eq!(merge_seo(&defaults(), Some(&p), "/solutions").title, "Solutions | Acme Modular");
        p.title_is_absolute = true;
        assert_eq!(merge_seo(&defaults(), Some(&p), "/solutions").title, "Solutions");
    }

    #[test]
    fn blank_override_fields_fall_back() {
        let mut p = page("/faq");
        p.title = Some("   ".into());
        p.description = Some(String::new());
        p.keywords = vec!["faq".into()];
        let seo = merge_seo(&defaults(), Some(&p), "/faq");
        assert_eq!(seo.title, "Acme Modular | Modular Building Rentals");
        assert_eq!(seo.description, "Modular offices, classrooms and storage for rent.");
        assert_eq!(seo.keywords, vec!["faq".to_string()]);
        assert_eq!(seo.og_image.as_deref(), Some("/og/default.jpg"));
    }

    #[test]
    fn no_index_overrides_robots() {
        let mut p = page("/thank-you");
        p.robots = Some("index, follow".into());
        p.no_index = Some(true);
        assert_eq!(merge_seo(&defaults(), Some(&p), "/thank-you").robots, NOINDEX);
        p.no_index = Some(false);
        p.robots = Some("noarchive".into());
        assert_eq!(merge_seo(&defaults(), Some(&p), "/thank-you").robots, "noarchive");
    }

    #[test]
    fn explicit_canonical_wins() {
        let mut p = page("/locations/denver");
        p.canonical_url = Some("https://www.acme-modular.example/locations/colorado".into());
        let seo = merge_seo(&defaults(), Some(&p), "/locations/denver");
        assert_eq!(seo.canonical_url, "https://www.acme-modular.example/locations/colorado");
    }

    #[test]
    fn paths_are_normalized() {
        assert_eq!(normalize_path("/about/").unwrap(), "/about");
        assert_eq!(normalize_path("about?utm=x").unwrap(), "/about");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("").unwrap(), "/");
        assert!(normalize_path("/a b").is_err());
        assert!(normalize_path("https://evil.example/x").is_err());
    }

    #[test]
    fn template_without_placeholder_keeps_title() {
        assert_eq!(render_title("Acme", "About"), "About");
        assert_eq!(render_title("%s - %s", "About"), "About - %s");
    }
}
