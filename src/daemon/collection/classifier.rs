//! Static mapping from a focused window to a category and a productivity weight.

use std::{fmt::Display, str::FromStr, sync::LazyLock};

use anyhow::anyhow;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Development,
    Communication,
    Entertainment,
    Productivity,
    WebBrowsing,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Development => "development",
            Category::Communication => "communication",
            Category::Entertainment => "entertainment",
            Category::Productivity => "productivity",
            Category::WebBrowsing => "web_browsing",
            Category::Other => "other",
        }
    }

    /// Fixed weight of how productive time in this category is assumed to be.
    pub fn productivity_score(&self) -> f64 {
        match self {
            Category::Development => 0.9,
            Category::Productivity => 0.8,
            Category::Communication => 0.6,
            Category::WebBrowsing => 0.4,
            Category::Entertainment => 0.1,
            Category::Other => 0.5,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Category::Development),
            "communication" => Ok(Category::Communication),
            "entertainment" => Ok(Category::Entertainment),
            "productivity" => Ok(Category::Productivity),
            "web_browsing" => Ok(Category::WebBrowsing),
            "other" => Ok(Category::Other),
            _ => Err(anyhow!("Unknown category {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub productivity_score: f64,
    pub url: Option<String>,
    pub file_path: Option<String>,
}

/// Keyword sets matched against the lowercased application name, in precedence order.
const APP_RULES: [(Category, &[&str]); 4] = [
    (
        Category::Development,
        &["code", "ide", "terminal", "cmd", "powershell"],
    ),
    (
        Category::Communication,
        &["slack", "teams", "discord", "zoom", "skype"],
    ),
    (
        Category::Entertainment,
        &["spotify", "netflix", "youtube", "steam", "game"],
    ),
    (
        Category::Productivity,
        &["excel", "word", "powerpoint", "notion", "obsidian"],
    ),
];

const BROWSERS: [&str; 8] = [
    "chrome", "firefox", "safari", "edge", "opera", "brave", "chromium", "vivaldi",
];

const EDITORS: [&str; 11] = [
    "code",
    "atom",
    "sublime",
    "notepad",
    "vim",
    "emacs",
    "vscode",
    "pycharm",
    "intellij",
    "eclipse",
    "visualstudio",
];

const DEVELOPMENT_SITES: [&str; 3] = ["github", "stackoverflow", "documentation"];
const ENTERTAINMENT_SITES: [&str; 3] = ["youtube", "netflix", "twitch"];

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)]+|www\.[^\s)]+").expect("URL pattern is valid"));

static PATH_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r#"[A-Za-z]:\\[^<>:"|?*\n]+"#).expect("Windows path pattern is valid"),
        Regex::new(r#"/[^<>:"|?*\n]+"#).expect("Unix path pattern is valid"),
    ]
});

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

pub fn is_browser(app_name: &str) -> bool {
    contains_any(&app_name.to_lowercase(), &BROWSERS)
}

pub fn is_editor(app_name: &str) -> bool {
    contains_any(&app_name.to_lowercase(), &EDITORS)
}

/// First matching keyword set wins. Browsers are refined by what the title says about the page.
pub fn categorize(app_name: &str, window_title: &str) -> Category {
    let app = app_name.to_lowercase();

    if let Some((category, _)) = APP_RULES
        .iter()
        .find(|(_, keywords)| contains_any(&app, keywords))
    {
        return *category;
    }

    if contains_any(&app, &BROWSERS) {
        let title = window_title.to_lowercase();
        return if contains_any(&title, &DEVELOPMENT_SITES) {
            Category::Development
        } else if contains_any(&title, &ENTERTAINMENT_SITES) {
            Category::Entertainment
        } else {
            Category::WebBrowsing
        };
    }

    Category::Other
}

pub fn extract_url(window_title: &str) -> Option<String> {
    URL_PATTERN
        .find(window_title)
        .map(|v| v.as_str().to_string())
}

pub fn extract_file_path(window_title: &str) -> Option<String> {
    PATH_PATTERNS
        .iter()
        .find_map(|pattern| pattern.find(window_title))
        .map(|v| v.as_str().trim().to_string())
}

pub fn classify(app_name: &str, window_title: &str) -> Classification {
    let category = categorize(app_name, window_title);
    Classification {
        category,
        productivity_score: category.productivity_score(),
        url: is_browser(app_name)
            .then(|| extract_url(window_title))
            .flatten(),
        file_path: is_editor(app_name)
            .then(|| extract_file_path(window_title))
            .flatten(),
    }
}
