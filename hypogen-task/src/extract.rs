//! Label extraction from raw model responses.
//!
//! Every extractor lowercases the response, takes the LAST match of its
//! pattern and returns [`OTHER_LABEL`] when nothing matches or the call
//! produced no text.

use regex::Regex;

use crate::error::{Result, TaskError};

/// Label returned when a response cannot be interpreted.
pub const OTHER_LABEL: &str = "other";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// Return the captured group as-is
    Capture,
    /// Map `headline 1` / `headline 2` onto the dataset's sentence labels
    Headline,
}

/// Turns model text into a normalized label.
#[derive(Debug, Clone)]
pub struct LabelExtractor {
    name: String,
    pattern: Regex,
    kind: Kind,
}

impl LabelExtractor {
    /// Build an extractor by name.
    ///
    /// Built-in names are `default`, `hotel_reviews`, `headline_binary`,
    /// `retweet` and `shoe`. `regex:<pattern>` compiles a custom pattern
    /// whose first capture group is the label.
    pub fn from_name(name: &str) -> Result<Self> {
        let (pattern, kind) = match name {
            "default" => (r"final answer:\s+<begin>(.*)<end>", Kind::Capture),
            "hotel_reviews" => (r"final answer:\s+(truthful|deceptive|other)", Kind::Capture),
            "headline_binary" => (r"answer:\s+(headline 1|headline 2|other)", Kind::Headline),
            "retweet" => (r"answer: the (\w+) tweet", Kind::Capture),
            "shoe" => (
                r"final answer:\s+(white|red|orange|green|blue|black)",
                Kind::Capture,
            ),
            custom => match custom.strip_prefix("regex:") {
                Some(pattern) => (pattern, Kind::Capture),
                None => return Err(TaskError::UnknownExtractor(custom.to_string())),
            },
        };

        let pattern = Regex::new(pattern)?;
        if pattern.captures_len() < 2 {
            return Err(TaskError::UnknownExtractor(format!(
                "{}: pattern needs a capture group",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            pattern,
            kind,
        })
    }

    /// Extractor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extract a label, or [`OTHER_LABEL`].
    pub fn extract(&self, text: Option<&str>) -> String {
        let Some(text) = text else {
            tracing::warn!(extractor = %self.name, "No response to extract a label from");
            return OTHER_LABEL.to_string();
        };

        let lowered = text.to_lowercase();
        let found = self
            .pattern
            .captures_iter(&lowered)
            .filter_map(|caps| caps.get(1))
            .last()
            .map(|m| m.as_str().to_string());

        let label = match (found, self.kind) {
            (Some(answer), Kind::Capture) => Some(answer),
            (Some(answer), Kind::Headline) => match answer.as_str() {
                "headline 1" => Some("Headline 1 has more clicks than Headline 2.".to_string()),
                "headline 2" => Some("Headline 2 has more clicks than Headline 1.".to_string()),
                _ => None,
            },
            (None, _) => None,
        };

        label.unwrap_or_else(|| {
            tracing::warn!(extractor = %self.name, response = %text, "Could not extract label");
            OTHER_LABEL.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_takes_last_match_lowercased() {
        let extractor = LabelExtractor::from_name("default").unwrap();
        let text = "Final answer: <begin>Red<end>\nOn reflection...\nFinal Answer: <begin>Blue<end>";
        assert_eq!(extractor.extract(Some(text)), "blue");
    }

    #[test]
    fn test_missing_response_is_other() {
        let extractor = LabelExtractor::from_name("default").unwrap();
        assert_eq!(extractor.extract(None), OTHER_LABEL);
        assert_eq!(extractor.extract(Some("no idea")), OTHER_LABEL);
    }

    #[test]
    fn test_retweet() {
        let extractor = LabelExtractor::from_name("retweet").unwrap();
        assert_eq!(
            extractor.extract(Some("Answer: The first tweet got more retweets")),
            "first"
        );
    }

    #[test]
    fn test_headline_mapping() {
        let extractor = LabelExtractor::from_name("headline_binary").unwrap();
        assert_eq!(
            extractor.extract(Some("Answer: Headline 2")),
            "Headline 2 has more clicks than Headline 1."
        );
        assert_eq!(extractor.extract(Some("Answer: other")), OTHER_LABEL);
    }

    #[test]
    fn test_shoe_and_hotel() {
        let shoe = LabelExtractor::from_name("shoe").unwrap();
        assert_eq!(shoe.extract(Some("Final answer: green")), "green");
        assert_eq!(shoe.extract(Some("Final answer: purple")), OTHER_LABEL);

        let hotel = LabelExtractor::from_name("hotel_reviews").unwrap();
        assert_eq!(hotel.extract(Some("final answer: Deceptive")), "deceptive");
    }

    #[test]
    fn test_custom_regex() {
        let extractor = LabelExtractor::from_name(r"regex:label=(\w+)").unwrap();
        assert_eq!(extractor.extract(Some("LABEL=Yes")), "yes");
    }

    #[test]
    fn test_unknown_and_invalid() {
        assert!(matches!(
            LabelExtractor::from_name("persuasion"),
            Err(TaskError::UnknownExtractor(_))
        ));
        assert!(matches!(
            LabelExtractor::from_name("regex:("),
            Err(TaskError::Pattern(_))
        ));
        assert!(LabelExtractor::from_name("regex:no groups").is_err());
    }
}
