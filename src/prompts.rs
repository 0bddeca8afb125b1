//! Prompt templates for every model call the pipeline makes.
//!
//! Building a prompt is pure: no I/O, and the only failure is an empty
//! required field.

use std::fmt;

use crate::errors::{CourseError, CourseResult};
use crate::models::{ExpandedContent, LESSONS_PER_SUBMODULE, MODULES_PER_COURSE, SUBMODULES_PER_MODULE};

/// Transcript characters sent for summarization
pub const TRANSCRIPT_PROMPT_CHARS: usize = 3000;
/// Lesson characters sent when explaining a video's relevance
pub const LESSON_CONTEXT_PROMPT_CHARS: usize = 500;

/// A system instruction plus the user-turn text
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}", self.system, self.user)
    }
}

#[derive(Debug, Clone)]
pub enum PromptRequest<'a> {
    Curriculum {
        subject: &'a str,
        background: &'a str,
        history_excerpt: Option<&'a str>,
        /// Shorter template asking for terse names, used after a malformed first attempt
        compact: bool,
    },
    LessonExpansion {
        subject: &'a str,
        module_title: &'a str,
        submodule_title: &'a str,
        lesson_title: &'a str,
        overview: &'a str,
        history_excerpt: Option<&'a str>,
    },
    LessonContent {
        subject: &'a str,
        lesson_title: &'a str,
        expansion: Option<&'a ExpandedContent>,
        overview: &'a str,
    },
    VideoQueries {
        lesson_text: &'a str,
        max_queries: usize,
    },
    VideoSummary {
        video_title: &'a str,
        transcript: &'a str,
    },
    VideoRelevance {
        video_title: &'a str,
        video_url: &'a str,
        lesson_context: &'a str,
    },
    Question {
        subject: &'a str,
        question: &'a str,
        lesson_context: Option<&'a str>,
        history_excerpt: Option<&'a str>,
    },
}

fn require(field: &str, value: &str) -> CourseResult<()> {
    if value.trim().is_empty() {
        return Err(CourseError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Truncate to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

fn history_block(history_excerpt: Option<&str>) -> String {
    match history_excerpt {
        Some(excerpt) if !excerpt.trim().is_empty() => {
            format!("\nLearner history (most recent first):\n{}\n", excerpt.trim())
        }
        _ => String::new(),
    }
}

pub fn build_prompt(request: &PromptRequest<'_>) -> CourseResult<Prompt> {
    match request {
        PromptRequest::Curriculum {
            subject,
            background,
            history_excerpt,
            compact,
        } => {
            require("subject", subject)?;
            let background = if background.trim().is_empty() {
                "No details provided"
            } else {
                background.trim()
            };
            let guidance = if *compact {
                "IMPORTANT: Generate ALL modules, ALL submodules and ALL lessons. Keep titles to a few words and overviews to one short sentence to avoid truncation."
            } else {
                "The curriculum should be progressive and tailored to the learner's background and challenges."
            };
            let user = format!(
                r#"Generate a comprehensive learning curriculum for {subject}.

Learner details: {background}
{history}
Create a curriculum with exactly {modules} modules, each containing exactly {submodules} submodules, and each submodule containing exactly {lessons} lessons. {guidance}

Return ONLY strict JSON with this exact structure:
{{
    "course": "{subject}",
    "modules": [
        {{
            "module_title": "Module Title",
            "submodules": [
                {{
                    "submodule_title": "Submodule Title",
                    "lessons": [
                        {{
                            "lesson_title": "Lesson Title",
                            "lesson_overview": "Brief description of what will be covered"
                        }}
                    ]
                }}
            ]
        }}
    ]
}}"#,
                subject = subject.trim(),
                background = background,
                history = history_block(*history_excerpt),
                modules = MODULES_PER_COURSE,
                submodules = SUBMODULES_PER_MODULE,
                lessons = LESSONS_PER_SUBMODULE,
                guidance = guidance,
            );
            Ok(Prompt {
                system: "You are an expert curriculum designer. Return ONLY valid JSON with no additional text or formatting.".to_string(),
                user,
            })
        }

        PromptRequest::LessonExpansion {
            subject,
            module_title,
            submodule_title,
            lesson_title,
            overview,
            history_excerpt,
        } => {
            require("subject", subject)?;
            require("lesson title", lesson_title)?;
            require("lesson overview", overview)?;
            let user = format!(
                r#"Expand the following lesson plan for learning {subject}.

Module: {module_title}
Submodule: {submodule_title}
Lesson: {lesson_title}
Current overview: {overview}
{history}
Provide a detailed lesson including learning objectives, key concepts, grammar points, vocabulary focus, practice exercises and cultural context (if relevant). If the learner has struggled with something before, address it explicitly.

Return as JSON:
{{
    "lesson_title": "Title",
    "learning_objectives": ["objective1", "objective2"],
    "key_concepts": ["concept1", "concept2"],
    "grammar_points": ["grammar1", "grammar2"],
    "vocabulary": ["word1", "word2"],
    "practice_exercises": ["exercise1", "exercise2"],
    "cultural_context": "cultural information",
    "detailed_content": "comprehensive lesson content"
}}"#,
                subject = subject.trim(),
                module_title = module_title,
                submodule_title = submodule_title,
                lesson_title = lesson_title.trim(),
                overview = overview.trim(),
                history = history_block(*history_excerpt),
            );
            Ok(Prompt {
                system: "You are an expert curriculum designer. Create comprehensive, practical lesson plans. Always respond with valid JSON in the requested format.".to_string(),
                user,
            })
        }

        PromptRequest::LessonContent {
            subject,
            lesson_title,
            expansion,
            overview,
        } => {
            require("subject", subject)?;
            require("lesson title", lesson_title)?;
            let context = match expansion {
                Some(expanded) => expanded.as_prompt_text(),
                None => {
                    require("lesson overview", overview)?;
                    format!("{}\n{}", lesson_title, overview)
                }
            };
            let user = format!(
                r#"Create a {subject} lesson with the following components.

Lesson context:
{context}

Create:
1. A story (30-40 sentences) that naturally incorporates the target vocabulary and grammar
2. Target words to focus on, marked in each sentence as __word__
3. An English translation of each sentence

Return as JSON:
{{
    "story": [
        {{
            "sentence": "Original sentence with __target__ words marked",
            "translation": "English translation",
            "target_words": ["word1", "word2"]
        }}
    ],
    "lesson_focus": {{
        "grammar_points": ["point1", "point2"],
        "vocabulary": ["word1", "word2", "word3"],
        "cultural_notes": "cultural information"
    }}
}}"#,
                subject = subject.trim(),
                context = context.trim(),
            );
            Ok(Prompt {
                system: "You are a language teacher who writes graded reading material. Always respond with valid JSON in the requested format.".to_string(),
                user,
            })
        }

        PromptRequest::VideoQueries {
            lesson_text,
            max_queries,
        } => {
            require("lesson text", lesson_text)?;
            let user = format!(
                r#"Based on this lesson, give me {count} search prompts for YouTube videos with content similar to the lesson.

Lesson:
{lesson}

Return ONLY a JSON array with exactly {count} search prompts as strings, for example:
["search prompt 1", "search prompt 2", "search prompt 3"]

Make the prompts specific and relevant to the lesson content."#,
                count = max_queries,
                lesson = lesson_text.trim(),
            );
            Ok(Prompt {
                system: "You are a helpful assistant that generates YouTube search prompts. Return ONLY valid JSON arrays.".to_string(),
                user,
            })
        }

        PromptRequest::VideoSummary {
            video_title,
            transcript,
        } => {
            require("transcript", transcript)?;
            let user = format!(
                r#"Summarize this YouTube video transcript in a concise and educational way.

Video title: {title}
Transcript:
{transcript}

Provide a 2-3 paragraph summary that captures the main concepts and key points, highlights practical examples, and makes the content easy for a learner to follow."#,
                title = video_title,
                transcript = truncate_chars(transcript.trim(), TRANSCRIPT_PROMPT_CHARS),
            );
            Ok(Prompt {
                system: "You are an educational content summarizer. Create clear, concise summaries that help students learn.".to_string(),
                user,
            })
        }

        PromptRequest::VideoRelevance {
            video_title,
            video_url,
            lesson_context,
        } => {
            require("video title", video_title)?;
            let user = format!(
                r#"Explain why this YouTube video is relevant to the current lesson.

Lesson context: {context}
Video title: {title}
Video URL: {url}

Provide a brief explanation (2-3 sentences) that connects the video to the lesson objectives and tells the learner what they gain from watching it."#,
                context = truncate_chars(lesson_context.trim(), LESSON_CONTEXT_PROMPT_CHARS),
                title = video_title,
                url = video_url,
            );
            Ok(Prompt {
                system: "You are an educational content curator. Explain why specific videos are relevant to lessons.".to_string(),
                user,
            })
        }

        PromptRequest::Question {
            subject,
            question,
            lesson_context,
            history_excerpt,
        } => {
            require("subject", subject)?;
            require("question", question)?;
            let lesson = lesson_context
                .map(|context| format!("\nCurrent lesson:\n{}\n", truncate_chars(context.trim(), TRANSCRIPT_PROMPT_CHARS)))
                .unwrap_or_default();
            let user = format!(
                r#"Subject: {subject}
{lesson}{history}
Question: {question}

Give a personalized answer that takes the learner's history and previous difficulties into account. If they struggled with a specific structure or concept before, address that directly."#,
                subject = subject.trim(),
                lesson = lesson,
                history = history_block(*history_excerpt),
                question = question.trim(),
            );
            Ok(Prompt {
                system: "You are a concise, patient tutor. Answer briefly and clearly.".to_string(),
                user,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curriculum_prompt_mentions_shape_and_background() {
        let prompt = build_prompt(&PromptRequest::Curriculum {
            subject: "Korean",
            background: "complete beginner",
            history_excerpt: None,
            compact: false,
        })
        .unwrap();

        assert!(prompt.user.contains("Korean"));
        assert!(prompt.user.contains("complete beginner"));
        assert!(prompt.user.contains("exactly 7 modules"));
        assert!(prompt.user.contains("exactly 10 submodules"));
        assert!(prompt.user.contains("exactly 10 lessons"));
        assert!(!prompt.user.contains("Learner history"));
    }

    #[test]
    fn test_history_excerpt_is_included() {
        let prompt = build_prompt(&PromptRequest::Curriculum {
            subject: "Korean",
            background: "",
            history_excerpt: Some("- Q: how do particles work?"),
            compact: true,
        })
        .unwrap();
        assert!(prompt.user.contains("Learner history"));
        assert!(prompt.user.contains("particles"));
        assert!(prompt.user.contains("No details provided"));
        assert!(prompt.user.contains("avoid truncation"));
    }

    #[test]
    fn test_rejects_empty_fields() {
        let result = build_prompt(&PromptRequest::Curriculum {
            subject: "   ",
            background: "beginner",
            history_excerpt: None,
            compact: false,
        });
        assert!(matches!(result, Err(CourseError::Validation(_))));

        let result = build_prompt(&PromptRequest::LessonExpansion {
            subject: "Korean",
            module_title: "Basics",
            submodule_title: "Hangul",
            lesson_title: "",
            overview: "Vowels",
            history_excerpt: None,
        });
        assert!(matches!(result, Err(CourseError::Validation(_))));

        let result = build_prompt(&PromptRequest::VideoSummary {
            video_title: "Title",
            transcript: "",
        });
        assert!(matches!(result, Err(CourseError::Validation(_))));
    }

    #[test]
    fn test_transcript_is_truncated_on_char_boundary() {
        let transcript = "가".repeat(TRANSCRIPT_PROMPT_CHARS + 50);
        let prompt = build_prompt(&PromptRequest::VideoSummary {
            video_title: "Hangul basics",
            transcript: &transcript,
        })
        .unwrap();
        assert_eq!(prompt.user.matches('가').count(), TRANSCRIPT_PROMPT_CHARS);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 2), "he");
        assert_eq!(truncate_chars("안녕하세요", 2), "안녕");
    }
}
