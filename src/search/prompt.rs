//! Prompt construction for the answer and follow-up generators, and parsing
//! of the follow-up output.

use crate::config::{
    ANSWER_MAX_TOKENS, ANSWER_TEMPERATURE, FOLLOW_UP_MAX_TOKENS, FOLLOW_UP_TEMPERATURE,
};
use crate::llm::{ChatMessage, GenerationRequest};

use super::sources::Source;

pub const MAX_FOLLOW_UP_QUESTIONS: usize = 5;

const INITIAL_PREAMBLE: &str = "\
You are 'Trip-Advisor AI', a specialized travel planning assistant. Your goal is to help users discover destinations and plan their perfect trip.

RESPONSE STYLE:
- Be enthusiastic, inspiring, and helpful.
- When a user asks about a destination, provide a captivating summary including key attractions, cultural highlights, and unique experiences.
- For travel planning queries (e.g., \"7-day itinerary for Japan\"), provide a structured, day-by-day plan.
- Always consider the user's potential interests (e.g., adventure, relaxation, culture, food).
- If the query is vague, ask clarifying questions to better understand their travel style and preferences (e.g., \"What's your budget?\", \"Who are you traveling with?\").

FORMAT:
- Use markdown for clear formatting (e.g., lists for itineraries, bold for key places).
- Include citations inline like [1], [2] when referencing specific information from the sources.
- Ensure citations match the source order provided.";

const FOLLOW_UP_PREAMBLE: &str = "\
You are 'Trip-Advisor AI', continuing a travel planning conversation.

REMEMBER:
- Maintain your enthusiastic and helpful travel expert persona.
- Build upon the previous parts of the trip we've planned.
- Use markdown for clarity.
- Cite your sources using the [1], [2] format.";

const QUESTIONS_PREAMBLE: &str = "\
You are a travel expert AI. Based on our current conversation, generate 5 insightful follow-up questions to help the user build out their travel plans.

RULES:
- Questions should be genuinely helpful for travel planning (e.g., \"Would you like to explore day trips from Tokyo?\", \"What kind of budget should we plan for accommodation?\").
- Avoid generic questions. Make them specific to the destinations and activities discussed.
- If the conversation is just starting, suggest broad exploratory questions (e.g., \"What kind of vibe are you looking for on this trip? Adventure, relaxation, or cultural immersion?\").
- If no good follow-up questions are possible, return an empty response.
- Return only the questions, one per line, no numbering or bullets.";

/// More than two turns means the client is continuing a conversation.
pub fn is_follow_up(history: &[ChatMessage]) -> bool {
    history.len() > 2
}

/// Messages for the streamed answer. Follow-ups carry every earlier turn;
/// the newest user turn is replaced by one embedding the fresh context.
pub fn answer_request(query: &str, history: &[ChatMessage], context: &str) -> GenerationRequest {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if is_follow_up(history) {
        messages.push(ChatMessage::system(FOLLOW_UP_PREAMBLE));
        messages.extend_from_slice(&history[..history.len() - 1]);
    } else {
        messages.push(ChatMessage::system(INITIAL_PREAMBLE));
    }
    messages.push(ChatMessage::user(format!(
        "Answer this query: \"{query}\"\n\nBased on these sources:\n{context}"
    )));

    GenerationRequest {
        messages,
        temperature: ANSWER_TEMPERATURE,
        max_tokens: ANSWER_MAX_TOKENS,
    }
}

pub fn follow_up_request(
    query: &str,
    history: &[ChatMessage],
    sources: &[Source],
) -> GenerationRequest {
    let preview = if is_follow_up(history) {
        history
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        format!("user: {query}")
    };

    let topics = if sources.is_empty() {
        String::new()
    } else {
        let titles: Vec<&str> = sources.iter().map(|s| s.title.as_str()).collect();
        format!("Available sources about: {}\n\n", titles.join(", "))
    };

    GenerationRequest {
        messages: vec![
            ChatMessage::system(QUESTIONS_PREAMBLE),
            ChatMessage::user(format!(
                "Query: {query}\n\nConversation context:\n{preview}\n\n{topics}Generate 5 diverse follow-up questions that would help the user learn more about this topic from different angles."
            )),
        ],
        temperature: FOLLOW_UP_TEMPERATURE,
        max_tokens: FOLLOW_UP_MAX_TOKENS,
    }
}

/// One question per non-blank line, at most five.
pub fn parse_follow_up_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(MAX_FOLLOW_UP_QUESTIONS)
        .map(String::from)
        .collect()
}

/// Answer text used when the allow-list removed every search result.
pub fn no_matching_domains_message(query: &str, domains: &[String]) -> String {
    format!(
        "I searched {} for \"{query}\", but none of the results came from those domains.\n\nYou can:\n- Try different domains\n- Relax the domain restriction\n- Or use different search terms",
        domains.join(", ")
    )
}
