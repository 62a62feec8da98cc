use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four independent result partitions. The category determines the
/// provider endpoint, the applicable search mode and the result bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    Tv,
    Person,
    Company,
}

impl Category {
    /// Fixed category order, also the concatenation order for the merged view.
    pub const ALL: [Category; 4] = [
        Category::Movie,
        Category::Tv,
        Category::Person,
        Category::Company,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::Tv => "tv",
            Category::Person => "person",
            Category::Company => "company",
        }
    }

    pub fn from_wire(s: &str) -> Option<Category> {
        match s {
            "movie" => Some(Category::Movie),
            "tv" => Some(Category::Tv),
            "person" => Some(Category::Person),
            "company" => Some(Category::Company),
            _ => None,
        }
    }

    /// The provider's discover endpoint only exists for movie and tv.
    pub fn supports_discover(&self) -> bool {
        matches!(self, Category::Movie | Category::Tv)
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active view selection: all categories merged, or a single one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFilter {
    Both,
    One(Category),
}

impl CategoryFilter {
    pub fn includes(&self, category: Category) -> bool {
        match self {
            CategoryFilter::Both => true,
            CategoryFilter::One(selected) => *selected == category,
        }
    }

    pub fn from_param(s: &str) -> Option<CategoryFilter> {
        match s {
            "both" | "all" => Some(CategoryFilter::Both),
            other => Category::from_wire(other).map(CategoryFilter::One),
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::Both => f.write_str("both"),
            CategoryFilter::One(category) => f.write_str(category.as_str()),
        }
    }
}
