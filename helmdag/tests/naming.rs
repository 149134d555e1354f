use helmdag::{release_name, Chart, MAX_RELEASE_NAME_LEN};

fn only_release_chars(s: &str) -> bool {
    s.chars().all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
}

#[test]
fn release_name_lowercases_and_collapses() {
    assert_eq!(release_name("redis"), "redis");
    assert_eq!(release_name("My Chart!!"), "my-chart");
    assert_eq!(release_name("a--b___c"), "a-b-c");
    assert_eq!(release_name("--leading-and-trailing--"), "leading-and-trailing");
    assert_eq!(release_name("Env 12 redis"), "env-12-redis");
}

#[test]
fn release_name_is_deterministic() {
    for input in ["toplevel", "⌘日本語", "Some Chart Title", "!!!"] {
        assert_eq!(release_name(input), release_name(input));
    }
}

#[test]
fn release_name_bounds_long_unicode_input() {
    let input = "⌘日本語-⌘日本語-⌘日本語-⌘日本語-⌘日本語-⌘日本語-⌘日本語-a-very-long-chart-name-indeed-far-beyond-the-limit";
    assert!(input.chars().count() > MAX_RELEASE_NAME_LEN);

    let name = release_name(input);
    assert!(!name.is_empty());
    assert!(name.chars().count() <= MAX_RELEASE_NAME_LEN);
    assert!(only_release_chars(&name), "got: {name}");
}

#[test]
fn release_name_falls_back_for_fully_stripped_input() {
    let name = release_name("⌘⌘⌘");
    assert!(!name.is_empty());
    assert!(name.starts_with("chart-"));
    assert!(only_release_chars(&name));
    // Deterministic, and distinct inputs get distinct fallbacks.
    assert_eq!(name, release_name("⌘⌘⌘"));
    assert_ne!(name, release_name("日本語"));
}

#[test]
fn release_name_of_empty_input_is_empty() {
    assert_eq!(release_name(""), "");
}

#[test]
fn chart_name_sanitizes_the_title() {
    let chart = Chart {
        title: "My Fancy Chart".to_string(),
        ..Default::default()
    };
    assert_eq!(chart.name(), "my-fancy-chart");

    let dotted = Chart {
        title: "svc.v2_Beta App".to_string(),
        ..Default::default()
    };
    assert_eq!(dotted.name(), "svc.v2_beta-app");
}
