//! Unit tests for generated file naming and download resolution.

use deck_forge::workflow::downloads::{
    download_location, generate_filename, is_generated_filename, resolve,
};
use deck_forge::AppError;

#[test]
fn generated_names_are_unique_and_well_formed() {
    let a = generate_filename();
    let b = generate_filename();

    assert_ne!(a, b);
    assert!(a.starts_with("presentation_") && a.ends_with(".pptx"), "{a}");
    assert!(is_generated_filename(&a));
}

#[test]
fn download_location_joins_prefix_and_name() {
    assert_eq!(
        download_location("/api/presentations/download/", "presentation_x.pptx"),
        "/api/presentations/download/presentation_x.pptx"
    );
    assert_eq!(download_location("/downloads", "f.pptx"), "/downloads/f.pptx");
}

#[test]
fn resolve_finds_an_existing_generated_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let name = generate_filename();
    std::fs::write(temp.path().join(&name), b"pptx").expect("write");

    let path = resolve(temp.path(), &name).expect("resolves");

    assert!(path.is_file());
    assert!(path.ends_with(&name));
}

#[test]
fn resolve_reports_not_found_for_everything_else() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("notes.txt"), b"x").expect("write");

    for name in [
        generate_filename().as_str(),
        "notes.txt",
        "../notes.txt",
        "/etc/passwd",
        "",
    ] {
        let err = resolve(temp.path(), name).expect_err(name);
        assert!(matches!(err, AppError::NotFound(_)), "{name}: {err}");
    }
}

#[cfg(unix)]
#[test]
fn resolve_rejects_symlinks_leaving_the_output_dir() {
    let outside = tempfile::tempdir().expect("tempdir");
    let root = tempfile::tempdir().expect("tempdir");
    let target = outside.path().join("secret.pptx");
    std::fs::write(&target, b"secret").expect("write");

    let name = generate_filename();
    std::os::unix::fs::symlink(&target, root.path().join(&name)).expect("symlink");

    let err = resolve(root.path(), &name).expect_err("escape");
    assert!(matches!(err, AppError::NotFound(_)));
}
