//! Unit tests for slide content sources and validation.

use std::future::Future;
use std::pin::Pin;

use deck_forge::workflow::content::{
    resolve_content, validate, BuiltinContent, ContentSource, FileContent, SlideContent,
    DEFAULT_TITLE, SLIDE_COUNT,
};
use deck_forge::{AppError, Result};

struct FixedContent(Result<Vec<SlideContent>>);

impl ContentSource for FixedContent {
    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
        _title: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SlideContent>>> + Send + 'a>> {
        let slides = self.0.clone();
        Box::pin(async move { slides })
    }
}

#[test]
fn builtin_deck_has_five_titled_slides() {
    let deck = BuiltinContent::deck(None);

    assert_eq!(deck.len(), SLIDE_COUNT);
    assert_eq!(deck[0].title, DEFAULT_TITLE);
    assert!(validate(&deck).is_ok());
    assert!(deck.iter().skip(1).all(|s| s.bullets.len() == 4));
}

#[test]
fn builtin_deck_uses_caller_title() {
    let deck = BuiltinContent::deck(Some("Quarterly Review"));
    assert_eq!(deck[0].title, "Quarterly Review");
}

#[test]
fn validate_rejects_wrong_count_and_blank_titles() {
    let mut deck = BuiltinContent::deck(None);
    deck.pop();
    assert!(matches!(validate(&deck), Err(AppError::InvalidContent(_))));

    let mut deck = BuiltinContent::deck(None);
    deck[2].title = "   ".into();
    let err = validate(&deck).expect_err("blank title");
    assert!(err.to_string().contains("slide 2"), "{err}");
}

#[tokio::test]
async fn resolve_content_keeps_valid_generated_slides() {
    let mut slides = BuiltinContent::deck(Some("Mine"));
    slides[1].notes = Some("say hello".into());
    let source = FixedContent(Ok(slides.clone()));

    assert_eq!(resolve_content(&source, "topic", None).await, slides);
}

#[tokio::test]
async fn resolve_content_falls_back_on_failure_or_bad_shape() {
    let failing = FixedContent(Err(AppError::InvalidContent("model offline".into())));
    let deck = resolve_content(&failing, "topic", Some("Fallback Title")).await;
    assert_eq!(deck, BuiltinContent::deck(Some("Fallback Title")));

    let short = FixedContent(Ok(vec![SlideContent::new("Only one", &["x"])]));
    let deck = resolve_content(&short, "topic", None).await;
    assert_eq!(deck, BuiltinContent::deck(None));
}

#[tokio::test]
async fn file_content_reads_json_and_accepts_content_alias() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("slides.json");
    std::fs::write(
        &path,
        r#"[
            {"title": "Intro", "content": ["Welcome"]},
            {"title": "Two", "bullets": ["a", "b"], "notes": "pause here"},
            {"title": "Three"},
            {"title": "Four", "content": []},
            {"title": "Five", "content": ["end"]}
        ]"#,
    )
    .expect("write");

    let slides = FileContent::new(&path)
        .generate("ignored", Some("Override"))
        .await
        .expect("parse");

    assert_eq!(slides.len(), 5);
    assert_eq!(slides[0].title, "Override");
    assert_eq!(slides[0].bullets, vec!["Welcome"]);
    assert_eq!(slides[1].notes.as_deref(), Some("pause here"));
    assert!(slides[2].bullets.is_empty());
}

#[tokio::test]
async fn file_content_errors_are_invalid_content() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = FileContent::new(temp.path().join("nope.json"));
    assert!(matches!(
        missing.generate("p", None).await,
        Err(AppError::InvalidContent(_))
    ));

    let path = temp.path().join("bad.json");
    std::fs::write(&path, "{not an array").expect("write");
    assert!(matches!(
        FileContent::new(&path).generate("p", None).await,
        Err(AppError::InvalidContent(_))
    ));
}
