//! In-memory backing store for the demo server.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::api::{
    Flashcard, FlashcardSet, Idea, IdeaSet, NewTag, Report, ResultType, SearchResult, Tag,
};

/// Default number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

const REPORT_EXCERPT_CHARS: usize = 200;
const IDEA_TITLE_CHARS: usize = 50;

#[derive(Debug, Clone)]
struct Video {
    id: i64,
    user_id: String,
    title: String,
    description: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    videos: Vec<Video>,
    tags: Vec<Tag>,
    reports: Vec<Report>,
    flashcard_sets: Vec<FlashcardSet>,
    idea_sets: Vec<IdeaSet>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn owns_video(&self, user_id: &str, video_id: i64) -> bool {
        self.videos
            .iter()
            .any(|video| video.id == video_id && video.user_id == user_id)
    }
}

/// Learning content grouped by owning user.
///
/// Flashcard sets, idea sets and reports belong to a video; a user can only
/// read content attached to their own videos.
#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<Tables>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_video(
        &self,
        user_id: &str,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> i64 {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.videos.push(Video {
            id,
            user_id: user_id.to_owned(),
            title: title.into(),
            description: description.into(),
            created_at: Utc::now(),
        });
        id
    }

    pub async fn add_report(
        &self,
        video_id: i64,
        title: impl Into<String>,
        content: impl Into<String>,
        kind: impl Into<String>,
    ) -> Report {
        let mut tables = self.tables.write().await;
        let report = Report {
            id: tables.next_id(),
            video_id,
            title: title.into(),
            content: content.into(),
            kind: kind.into(),
            created_at: Utc::now(),
        };
        tables.reports.push(report.clone());
        report
    }

    /// Adds a set with one card per `(question, answer)` pair.
    pub async fn add_flashcard_set(
        &self,
        video_id: i64,
        title: impl Into<String>,
        cards: &[(&str, &str)],
    ) -> FlashcardSet {
        let mut tables = self.tables.write().await;
        let set_id = tables.next_id();
        let now = Utc::now();
        let mut flashcards = Vec::with_capacity(cards.len());
        for (question, answer) in cards {
            flashcards.push(Flashcard {
                id: tables.next_id(),
                flashcard_set_id: set_id,
                question: (*question).to_owned(),
                answer: (*answer).to_owned(),
                created_at: now,
            });
        }
        let set = FlashcardSet {
            id: set_id,
            video_id,
            title: title.into(),
            description: None,
            created_at: now,
            flashcards,
        };
        tables.flashcard_sets.push(set.clone());
        set
    }

    pub async fn add_idea_set(
        &self,
        video_id: i64,
        kind: impl Into<String>,
        ideas: &[&str],
    ) -> IdeaSet {
        let mut tables = self.tables.write().await;
        let set_id = tables.next_id();
        let now = Utc::now();
        let mut items = Vec::with_capacity(ideas.len());
        for content in ideas {
            items.push(Idea {
                id: tables.next_id(),
                idea_set_id: set_id,
                content: (*content).to_owned(),
                created_at: now,
            });
        }
        let set = IdeaSet {
            id: set_id,
            video_id,
            kind: kind.into(),
            created_at: now,
            ideas: items,
        };
        tables.idea_sets.push(set.clone());
        set
    }

    pub async fn user_tags(&self, user_id: &str) -> Vec<Tag> {
        let tables = self.tables.read().await;
        tables
            .tags
            .iter()
            .filter(|tag| tag.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Stores a tag. Input is expected to be validated already.
    pub async fn create_tag(&self, user_id: &str, tag: NewTag) -> Tag {
        let mut tables = self.tables.write().await;
        let created = Tag {
            id: tables.next_id(),
            user_id: user_id.to_owned(),
            name: tag.name,
            color: tag.color,
            created_at: Utc::now(),
        };
        debug!(id = created.id, user_id, "tag created");
        tables.tags.push(created.clone());
        created
    }

    pub async fn flashcard_set(&self, user_id: &str, id: i64) -> Option<FlashcardSet> {
        let tables = self.tables.read().await;
        tables
            .flashcard_sets
            .iter()
            .find(|set| set.id == id && tables.owns_video(user_id, set.video_id))
            .cloned()
    }

    pub async fn idea_set(&self, user_id: &str, id: i64) -> Option<IdeaSet> {
        let tables = self.tables.read().await;
        tables
            .idea_sets
            .iter()
            .find(|set| set.id == id && tables.owns_video(user_id, set.video_id))
            .cloned()
    }

    pub async fn report(&self, user_id: &str, id: i64) -> Option<Report> {
        let tables = self.tables.read().await;
        tables
            .reports
            .iter()
            .find(|report| report.id == id && tables.owns_video(user_id, report.video_id))
            .cloned()
    }

    /// Case-insensitive search over the user's content, best matches first.
    ///
    /// Videos and reports match on title, flashcards on question and ideas on
    /// content. `None` searches every type.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        result_type: Option<ResultType>,
        limit: usize,
    ) -> Vec<SearchResult> {
        let needle = query.to_lowercase();
        let wants = |kind: ResultType| result_type.is_none_or(|t| t == kind);
        let now = Utc::now();
        let tables = self.tables.read().await;
        let mut results = Vec::new();

        let mut push = |id, kind, title: String, excerpt: String, content: &str, created_at| {
            let score = relevance(&title, content, created_at, &needle, now);
            results.push(SearchResult {
                id,
                result_type: kind,
                title,
                excerpt,
                created_at,
                score,
            });
        };

        for video in tables.videos.iter().filter(|v| v.user_id == user_id) {
            if wants(ResultType::Video) && contains(&video.title, &needle) {
                push(
                    video.id,
                    ResultType::Video,
                    video.title.clone(),
                    video.description.clone(),
                    &video.description,
                    video.created_at,
                );
            }
        }

        if wants(ResultType::Report) {
            for report in &tables.reports {
                if tables.owns_video(user_id, report.video_id) && contains(&report.title, &needle) {
                    push(
                        report.id,
                        ResultType::Report,
                        report.title.clone(),
                        truncate(&report.content, REPORT_EXCERPT_CHARS),
                        &report.content,
                        report.created_at,
                    );
                }
            }
        }

        if wants(ResultType::Flashcard) {
            let sets = tables
                .flashcard_sets
                .iter()
                .filter(|set| tables.owns_video(user_id, set.video_id));
            for card in sets.flat_map(|set| &set.flashcards) {
                if contains(&card.question, &needle) {
                    push(
                        card.id,
                        ResultType::Flashcard,
                        card.question.clone(),
                        card.answer.clone(),
                        &card.answer,
                        card.created_at,
                    );
                }
            }
        }

        if wants(ResultType::Idea) {
            let sets = tables
                .idea_sets
                .iter()
                .filter(|set| tables.owns_video(user_id, set.video_id));
            for idea in sets.flat_map(|set| &set.ideas) {
                if contains(&idea.content, &needle) {
                    push(
                        idea.id,
                        ResultType::Idea,
                        truncate(&idea.content, IDEA_TITLE_CHARS),
                        idea.content.clone(),
                        &idea.content,
                        idea.created_at,
                    );
                }
            }
        }

        results.sort_by(|a, b| b.score.cmp(&a.score));
        results.truncate(limit);
        results
    }
}

fn contains(haystack: &str, lowercase_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowercase_needle)
}

fn truncate(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

/// Title match 100, content match 50, plus up to 30 for content created in
/// the last 30 days.
fn relevance(
    title: &str,
    content: &str,
    created_at: DateTime<Utc>,
    lowercase_query: &str,
    now: DateTime<Utc>,
) -> i64 {
    let mut score = 0;
    if contains(title, lowercase_query) {
        score += 100;
    }
    if contains(content, lowercase_query) {
        score += 50;
    }
    let days = (now - created_at).num_days();
    score + (30 - days).max(0)
}
