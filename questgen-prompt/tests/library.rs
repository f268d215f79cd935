use questgen_core::{context, GenerationError};
use questgen_prompt::{PromptLibrary, PromptSpec};

#[test]
fn build_is_deterministic() {
    let library = PromptLibrary::builtin();
    let ctx = context! { "topic" => "volcanoes", "age_range" => "10-12" };

    let first = library.build("quest_outline", &ctx).unwrap();
    let second = library.build("quest_outline", &ctx).unwrap();

    assert_eq!(first, second);
}

#[test]
fn quest_prompt_mentions_topic_and_fragments() {
    let library = PromptLibrary::builtin();
    let ctx = context! { "topic" => "volcanoes", "age_range" => "10-12" };

    let prompt = library.build("quest_outline", &ctx).unwrap();

    assert!(prompt.contains("volcanoes"));
    assert!(prompt.contains("10-12"));
    assert!(prompt.contains("single JSON object"));
    assert!(!prompt.contains("{{"));
    assert!(!prompt.contains("Additional context"));
}

#[test]
fn unknown_template_is_a_configuration_error() {
    let err = PromptLibrary::builtin()
        .build("lesson_plan", &context! { "topic" => "tides" })
        .unwrap_err();

    assert!(matches!(err, GenerationError::Configuration(ref msg) if msg.contains("lesson_plan")));
}

#[test]
fn missing_required_context_lists_every_key() {
    let err = PromptLibrary::builtin()
        .build("course_outline", &context! {})
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("subject"));
    assert!(message.contains("age_range"));
}

#[test]
fn extra_context_is_appended_in_key_order() {
    let library = PromptLibrary::builtin();
    let ctx = context! {
        "theme" => "kindness",
        "tone" => "playful",
        "audience" => "families",
    };

    let prompt = library.build("badge_concept", &ctx).unwrap();

    assert!(prompt.ends_with("Additional context:\n- audience: families\n- tone: playful"));
}

#[test]
fn template_values_override_fragment_text_only_where_placed() {
    let library = PromptLibrary::new()
        .with_fragment("intro", "Intro {{topic}}")
        .with_template(
            "t",
            PromptSpec::new("About {{topic}} and {{ topic }}.").fragments(["intro"]),
        );

    let prompt = library.build("t", &context! { "topic" => "rivers" }).unwrap();

    // Fragments are static text; only the body is rendered.
    assert_eq!(prompt, "Intro {{topic}}\n\nAbout rivers and rivers.");
}

#[test]
fn non_string_values_render_as_json() {
    let library = PromptLibrary::new().with_template("t", PromptSpec::new("n={{n}} tags={{tags}}"));
    let ctx = context! { "n" => 3, "tags" => serde_json::json!(["a", "b"]) };

    assert_eq!(library.build("t", &ctx).unwrap(), r#"n=3 tags=["a","b"]"#);
}

#[test]
fn merge_replaces_same_named_templates() {
    let mut library = PromptLibrary::builtin();
    library.merge(
        PromptLibrary::new().with_template("badge_concept", PromptSpec::new("Badge: {{theme}}")),
    );

    let prompt = library
        .build("badge_concept", &context! { "theme" => "courage" })
        .unwrap();

    assert_eq!(prompt, "Badge: courage");
    assert!(library.contains("quest_outline"));
}
