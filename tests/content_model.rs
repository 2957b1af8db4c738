mod common;

use modular_site_cms::config::IncludeDirection;
use modular_site_cms::{load_from_dir, model_checksum, resolve};

#[tokio::test]
async fn shipped_content_model_resolves() {
    let config = load_from_dir(&common::content_dir()).await.unwrap();
    let model = resolve(&config).unwrap();
    let mut segments = model.path_segments();
    segments.sort_unstable();
    assert_eq!(
        segments,
        [
            "faq-pages",
            "faqs",
            "homepage-sections",
            "industries",
            "locations",
            "news-articles",
            "solutions",
            "testimonials"
        ]
    );

    let faqs = model.entity_by_path("faqs").unwrap();
    let link = faqs.include("faq-pages").unwrap();
    assert_eq!(link.direction, IncludeDirection::ToMany);
    assert_eq!(link.their_key_column, "faq_id");

    let news = model.entity_by_path("news-articles").unwrap();
    assert!(news.sensitive_columns.contains("author_email"));
    assert_eq!(news.slug_column.as_deref(), Some("slug"));
    assert!(!news.allows("nonsense"));
}

#[tokio::test]
async fn checksum_is_stable_across_loads() {
    let a = load_from_dir(&common::content_dir()).await.unwrap();
    let b = load_from_dir(&common::content_dir()).await.unwrap();
    assert_eq!(model_checksum(&a).unwrap(), model_checksum(&b).unwrap());
}
