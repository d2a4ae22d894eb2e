//! Unit tests for destination path templates

use std::path::PathBuf;
use std::sync::Arc;

use artwork_crawler::output::{DestinationWriter, FsDestination, OutputError, PathTemplate};
use artwork_crawler::{ContentId, SubPart, WorkItem};
use bytes::Bytes;
use tempfile::TempDir;

fn sample() -> (WorkItem, SubPart) {
    let part = SubPart::new(2, "https://img.example/990_p2.jpg", "990_p2.jpg");
    let mut item = WorkItem::new(
        ContentId::new(990),
        "Night/Day",
        "sora",
        vec![
            SubPart::new(0, "https://img.example/990_p0.jpg", "990_p0.jpg"),
            SubPart::new(1, "https://img.example/990_p1.jpg", "990_p1.jpg"),
            part.clone(),
        ],
    );
    item.author_id = Some("4411".to_string());
    (item, part)
}

#[test]
fn test_nested_template() {
    let (item, part) = sample();
    let template = PathTemplate::parse("{author_id}/{title}/{file_name}").unwrap();
    assert_eq!(
        template.render(&item, &part).unwrap(),
        PathBuf::from("4411").join("Night_Day").join("990_p2.jpg")
    );
}

#[test]
fn test_rejected_templates() {
    for bad in ["/abs/{id}", "{id}/../x", "{nope}", "{id", "a//b"] {
        assert!(
            matches!(PathTemplate::parse(bad), Err(OutputError::InvalidTemplate(_))),
            "template {bad} should be rejected"
        );
    }
}

#[test]
fn test_custom_sanitizer() {
    let (item, part) = sample();
    let template = PathTemplate::parse("{title}.{ext}")
        .unwrap()
        .with_sanitizer(Arc::new(|value: &str| value.to_lowercase().replace('/', "-")));
    assert_eq!(template.render(&item, &part).unwrap(), PathBuf::from("night-day.jpg"));
}

#[test]
fn test_empty_rendered_segment_is_an_error() {
    let (mut item, part) = sample();
    item.title = String::new();
    let template = PathTemplate::parse("{title}/{file_name}").unwrap();
    assert!(matches!(
        template.render(&item, &part),
        Err(OutputError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn test_fs_destination_round_trip() {
    let dir = TempDir::new().unwrap();
    let (item, part) = sample();
    let destination = FsDestination::new(dir.path())
        .with_template(PathTemplate::parse("{author}/{id}_p{page}.{ext}").unwrap());

    assert!(!destination.exists(&item, &part).await);
    destination
        .write(&item, &part, Bytes::from_static(b"pixels"))
        .await
        .unwrap();
    assert!(destination.exists(&item, &part).await);

    let written = dir.path().join("sora").join("990_p2.jpg");
    assert_eq!(std::fs::read(&written).unwrap(), b"pixels".to_vec());
    assert_eq!(destination.describe(&item, &part), written.display().to_string());
}
