//! Prompt construction for comparisons and follow-up questions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which comparison brief to send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptVariant {
    /// Compare the two books and say which is better.
    #[default]
    Overview,
    /// Eight numbered criteria, topic by topic.
    Structured,
    /// Chapter-by-chapter alignment of the second book with NCERT guidelines.
    CurriculumAlignment,
}

impl PromptVariant {
    pub const ALL: [PromptVariant; 3] = [
        PromptVariant::Overview,
        PromptVariant::Structured,
        PromptVariant::CurriculumAlignment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptVariant::Overview => "overview",
            PromptVariant::Structured => "structured",
            PromptVariant::CurriculumAlignment => "curriculum-alignment",
        }
    }

    /// Heading shown above the comparison result.
    pub fn title(&self) -> &'static str {
        match self {
            PromptVariant::Overview | PromptVariant::Structured => "Textbook Comparison",
            PromptVariant::CurriculumAlignment => {
                "Suggestions for Class 1 Value Education based on NCERT Guidelines"
            }
        }
    }

    fn template(&self) -> &'static str {
        match self {
            PromptVariant::Overview => OVERVIEW,
            PromptVariant::Structured => STRUCTURED,
            PromptVariant::CurriculumAlignment => CURRICULUM_ALIGNMENT,
        }
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "overview" => Ok(Self::Overview),
            "structured" => Ok(Self::Structured),
            "curriculum-alignment" | "ncert" => Ok(Self::CurriculumAlignment),
            other => Err(format!(
                "unknown prompt variant: {other}. Expected: overview, structured, or curriculum-alignment"
            )),
        }
    }
}

const HEADER: &str = "Textbook 1 ({book1_name}):\n{book1_text}\n\nTextbook 2 ({book2_name}):\n{book2_text}\n\n";

const OVERVIEW: &str = "Compare the following two textbooks and determine which one is better based on their content.\n\n\
{header}\
Provide a detailed analysis including which textbook has better coverage of topics, clarity of explanations, accuracy of information, \
and overall quality of the content. Additionally, consider how well each textbook addresses the subject matter and its usefulness for learning.";

const STRUCTURED: &str = "Compare the following two textbooks and determine which one is better based on their content.\n\n\
{header}\
1. **Topics Covered:** List the topics covered in each textbook point by point.\n\
2. **Clarity:** Analyze the clarity of explanations for each topic.\n\
3. **Accuracy:** Assess the accuracy of the information presented in each topic.\n\
4. **Depth of Coverage:** Evaluate the depth to which each topic is covered.\n\
5. **Usefulness for Learning:** Compare how useful each textbook is for learning the subject.\n\
6. **Additional Insights:** Identify any unique insights or additional information provided by each textbook.\n\
7. **Overall Comparison:** Provide an overall comparison, emphasizing that both textbooks are great resources.\n\
8. **Suggestions for Improvement:** Suggest any improvements or additional content that could be added to enhance both textbooks.";

// `{chapter_name}` is left for the model to fill in per chapter.
const CURRICULUM_ALIGNMENT: &str = "Conduct a comparative analysis of the following two textbooks. \
The first textbook is '{book1_name}', and the second textbook is '{book2_name}'. \
This analysis is intended for educators, curriculum developers, and parents to evaluate how well '{book2_name}' aligns with NCERT guidelines:\n\n\
{header}\
Provide a detailed analysis of each chapter in '{book2_name}', focusing on its alignment with NCERT guidelines. For each chapter, address the following:\n\n\
  **{chapter_name} - Alignment with NCERT Guidelines**:\n\
  1. What are the strengths of the chapter '{chapter_name}' in terms of content coverage, clarity, relevance to learning objectives, and use of age-appropriate examples? Provide at least six to ten points.\n\
  2. Provide constructive suggestions for improving '{chapter_name}', including additional pictures, activities, exercises, and examples that could be added to better align with NCERT guidelines.\n\
  3. Give specific and age-appropriate examples that could help enhance the understanding of six-year-old children.\n\
  4. Identify any unique elements in '{chapter_name}' that make it particularly effective for achieving the NCERT learning objectives.\n\
  5. Overall, summarize the alignment of '{book2_name}' with NCERT guidelines, focusing on how its chapters provide a valuable learning experience while adhering to NCERT standards.\n\
  6. List all the difficult words used in each chapter that may be hard to understand for six to seven year old children or class 1 students, and suggest simpler replacements for them.";

/// Builds the prompts a session sends.
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    pub variant: PromptVariant,
    /// Replaces the variant's comparison text when set. Placeholders:
    /// `{book1_name}`, `{book1_text}`, `{book2_name}`, `{book2_text}`.
    pub custom_template: Option<String>,
}

impl PromptSet {
    pub fn new(variant: PromptVariant) -> Self {
        Self {
            variant,
            custom_template: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.custom_template = Some(template.into());
        self
    }

    pub fn comparison(&self, books: [(&str, &str); 2]) -> String {
        let template = match self.custom_template {
            Some(ref t) => t.as_str(),
            None => self.variant.template(),
        };
        let [(name1, text1), (name2, text2)] = books;

        fill(
            &template.replace("{header}", HEADER),
            &[
                ("{book1_name}", name1),
                ("{book1_text}", text1),
                ("{book2_name}", name2),
                ("{book2_text}", text2),
            ],
        )
    }

    pub fn question(&self, book_name: &str, chunk: &str, question: &str) -> String {
        format!(
            "Context from {book_name}:\n{chunk}\n\nBased on the above context, please answer the following question:\n\n{question}"
        )
    }
}

/// Substitute placeholders in a single left-to-right pass. Inserted values
/// are never rescanned, so book text that looks like a placeholder survives.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_embeds_both_books() {
        for variant in PromptVariant::ALL {
            let prompt = PromptSet::new(variant).comparison([
                ("Alpha.pdf", "alpha body"),
                ("Beta.pdf", "beta body"),
            ]);
            assert!(prompt.contains("Textbook 1 (Alpha.pdf):\nalpha body\n\n"), "{variant}");
            assert!(prompt.contains("Textbook 2 (Beta.pdf):\nbeta body\n\n"), "{variant}");
            assert!(!prompt.contains("{book"), "{variant} left a placeholder");
        }
    }

    #[test]
    fn curriculum_variant_keeps_chapter_placeholder() {
        let prompt = PromptSet::new(PromptVariant::CurriculumAlignment)
            .comparison([("NCERT.pdf", "a"), ("Scope.pdf", "b")]);
        assert!(prompt.contains("each chapter in 'Scope.pdf'"));
        assert!(prompt.contains("{chapter_name}"));
    }

    #[test]
    fn custom_template_overrides_variant() {
        let prompts = PromptSet::new(PromptVariant::Structured)
            .with_template("{book1_name} vs {book2_name}: {book1_text} / {book2_text}");
        let prompt = prompts.comparison([("A", "x"), ("B", "y")]);
        assert_eq!(prompt, "A vs B: x / y");
    }

    #[test]
    fn book_text_is_not_treated_as_template() {
        let prompt = PromptSet::default()
            .with_template("{book1_text}|{book2_text}")
            .comparison([("A", "mentions {book2_text}"), ("B", "y")]);
        assert_eq!(prompt, "mentions {book2_text}|y");
    }

    #[test]
    fn question_prompt_layout() {
        let prompt = PromptSet::default().question("Maths.pdf", "Chunk text", "What is 2+2?");
        assert_eq!(
            prompt,
            "Context from Maths.pdf:\nChunk text\n\nBased on the above context, please answer the following question:\n\nWhat is 2+2?"
        );
    }

    #[test]
    fn variant_parses_from_config_spellings() {
        assert_eq!("structured".parse::<PromptVariant>().unwrap(), PromptVariant::Structured);
        assert_eq!(
            "curriculum_alignment".parse::<PromptVariant>().unwrap(),
            PromptVariant::CurriculumAlignment
        );
        assert_eq!("NCERT".parse::<PromptVariant>().unwrap(), PromptVariant::CurriculumAlignment);
        assert!("fancy".parse::<PromptVariant>().is_err());
    }

    #[test]
    fn variant_round_trips_through_toml() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            variant: PromptVariant,
        }
        let toml_str = toml::to_string(&Wrapper {
            variant: PromptVariant::CurriculumAlignment,
        })
        .unwrap();
        assert_eq!(toml_str.trim(), "variant = \"curriculum-alignment\"");
    }
}
