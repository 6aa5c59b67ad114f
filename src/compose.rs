//! Turning detection batches into one spoken sentence
//!
//! The perception side reports `{label, position, confidence}` records per
//! frame. People are counted and located first, everything else is listed
//! after, so a typical sentence reads
//! "There are 2 persons. One in top left. One in center. Also, I see: chair in bottom right".

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Cell of the 3x3 grid a detection's center falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridPosition {
    #[serde(rename = "top left")]
    TopLeft,
    #[serde(rename = "top center")]
    TopCenter,
    #[serde(rename = "top right")]
    TopRight,
    #[serde(rename = "middle left")]
    MiddleLeft,
    #[serde(rename = "center")]
    Center,
    #[serde(rename = "middle right")]
    MiddleRight,
    #[serde(rename = "bottom left")]
    BottomLeft,
    #[serde(rename = "bottom center")]
    BottomCenter,
    #[serde(rename = "bottom right")]
    BottomRight,
}

impl GridPosition {
    const GRID: [[GridPosition; 3]; 3] = [
        [Self::TopLeft, Self::TopCenter, Self::TopRight],
        [Self::MiddleLeft, Self::Center, Self::MiddleRight],
        [Self::BottomLeft, Self::BottomCenter, Self::BottomRight],
    ];

    /// Cell at `row`, `col`; out-of-range indices clamp to the edge
    pub fn from_cell(row: usize, col: usize) -> Self {
        Self::GRID[row.min(2)][col.min(2)]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TopLeft => "top left",
            Self::TopCenter => "top center",
            Self::TopRight => "top right",
            Self::MiddleLeft => "middle left",
            Self::Center => "center",
            Self::MiddleRight => "middle right",
            Self::BottomLeft => "bottom left",
            Self::BottomCenter => "bottom center",
            Self::BottomRight => "bottom right",
        }
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One object reported by the perception component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub position: GridPosition,
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: &str, position: GridPosition, confidence: f32) -> Self {
        Self {
            label: label.to_string(),
            position,
            confidence,
        }
    }

    fn is_person(&self) -> bool {
        self.label.eq_ignore_ascii_case("person")
    }
}

/// Parse one JSON array of detection records
pub fn parse_detections(line: &str) -> Result<Vec<Detection>> {
    Ok(serde_json::from_str(line)?)
}

/// Builds announcement sentences from the detections worth mentioning
#[derive(Debug, Clone)]
pub struct Composer {
    min_confidence: f32,
    /// Lowercase labels worth announcing; `None` announces everything
    labels: Option<HashSet<String>>,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(0.5, None)
    }
}

impl Composer {
    pub fn new(min_confidence: f32, labels: Option<HashSet<String>>) -> Self {
        Self {
            min_confidence,
            labels: labels.map(|set| set.into_iter().map(|l| l.to_lowercase()).collect()),
        }
    }

    fn wanted(&self, detection: &Detection) -> bool {
        if detection.confidence < self.min_confidence {
            return false;
        }
        match &self.labels {
            Some(labels) => labels.contains(&detection.label.to_lowercase()),
            None => true,
        }
    }

    /// Sentence for `detections`, or `None` if nothing passes the filters
    ///
    /// Repeated scenes are not suppressed here; the announcer does that
    /// against what the worker actually attempted.
    pub fn compose(&self, detections: &[Detection]) -> Option<String> {
        let kept: Vec<&Detection> = detections.iter().filter(|d| self.wanted(d)).collect();
        describe(&kept)
    }
}

fn describe(detections: &[&Detection]) -> Option<String> {
    let (persons, others): (Vec<&Detection>, Vec<&Detection>) =
        detections.iter().copied().partition(|d| d.is_person());

    let mut sentences = Vec::new();

    if !persons.is_empty() {
        if persons.len() == 1 {
            sentences.push("There is 1 person.".to_string());
        } else {
            sentences.push(format!("There are {} persons.", persons.len()));
        }
        for person in &persons {
            sentences.push(format!("One in {}.", person.position));
        }
    }

    if !others.is_empty() {
        let items: Vec<String> = others
            .iter()
            .map(|d| format!("{} in {}", d.label, d.position))
            .collect();
        let prefix = if persons.is_empty() {
            "I see: "
        } else {
            "Also, I see: "
        };
        sentences.push(format!("{}{}", prefix, join_list(&items)));
    }

    if sentences.is_empty() {
        None
    } else {
        Some(sentences.join(" "))
    }
}

/// "a", "a and b", "a, b, and c"
fn join_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{} and {}", first, second),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}
