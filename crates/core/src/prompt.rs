use crate::geo::{format_distance, haversine_distance};
use crate::locations::LocationTable;
use crate::models::{Coordinates, HydratedReview, Language};
use std::fmt::Write;

/// Everything the generator is allowed to know about one question.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub locations: &'a LocationTable,
    pub reviews: &'a [HydratedReview],
    pub user_coordinates: Option<Coordinates>,
    pub language: Language,
}

pub fn build_system_prompt(context: &PromptContext<'_>) -> String {
    let language = context.language.english_name();
    let mut prompt = String::from(
        "You are a campus guide that answers questions about places on campus using student reviews.\n\n",
    );

    prompt.push_str("Instructions:\n");
    prompt.push_str("- Answer only from the reviews listed below\n");
    prompt.push_str(
        "- Do not invent places, facts, opening hours or prices that the reviews do not mention\n",
    );
    prompt.push_str("- If reviews disagree, say that opinions differ and summarize each side\n");
    prompt.push_str("- If the reviews do not answer the question, say that no review covers it\n");
    prompt.push_str("- Write plain text only, without markdown, bullet symbols or headings\n");
    let _ = writeln!(prompt, "- Answer in {language}, whatever language the question uses");

    if let Some(user) = context.user_coordinates {
        let _ = writeln!(
            prompt,
            "\nThe user is currently at latitude {:.5}, longitude {:.5}. Distances below are measured from the user.",
            user.lat, user.lon
        );
    }

    prompt.push_str("\nReviews:\n");
    if context.reviews.is_empty() {
        prompt.push_str("No reviews matched this question.\n");
        return prompt;
    }

    for (index, hydrated) in context.reviews.iter().enumerate() {
        prompt.push('\n');
        prompt.push_str(&format_review(index + 1, hydrated, context));
    }

    prompt
}

/// The generator receives the question as the user typed it.
pub fn build_user_message(question: &str) -> String {
    question.to_string()
}

fn format_review(number: usize, hydrated: &HydratedReview, context: &PromptContext<'_>) -> String {
    let review = &hydrated.review;
    let author = hydrated
        .user
        .as_ref()
        .map(|user| user.name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or("Anonymous");

    let location = review.location_id.as_deref();
    let location_name = location
        .and_then(|id| context.locations.display_name(id, context.language))
        .unwrap_or("Unknown location");

    let mut entry = String::new();
    let _ = writeln!(entry, "[Review {number}]");
    let _ = writeln!(entry, "Title: {}", review.title);
    let _ = writeln!(entry, "Author: {author}");
    let _ = writeln!(entry, "Date: {}", review.created_at.format("%Y-%m-%d"));
    let _ = writeln!(entry, "Location: {location_name}");

    let place = location
        .and_then(|id| context.locations.get(id))
        .and_then(|location| location.coordinates);
    if let (Some(user), Some(place)) = (context.user_coordinates, place) {
        let _ = writeln!(
            entry,
            "Distance from user: {}",
            format_distance(haversine_distance(user, place))
        );
    }

    let _ = writeln!(entry, "Relevance: {:.2}", hydrated.score);
    let _ = writeln!(entry, "Content: {}", review.content.trim());
    entry
}
