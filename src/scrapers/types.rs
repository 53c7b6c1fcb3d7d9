use serde::{Deserialize, Serialize};

/// One (location, category) pair of a harvest run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    /// Free-text query sent to the source
    pub text: String,
    pub city: String,
    pub category: String,
}

impl SearchQuery {
    /// Category search in a city, e.g. "піцерія у Львів"
    pub fn category_in_city(category: &str, city: &str) -> Self {
        Self {
            text: format!("{} у {}", category, city),
            city: city.to_string(),
            category: category.to_string(),
        }
    }

    /// Search for one named restaurant, e.g. "Mafia Київ"
    pub fn named(name: &str, city: &str, category: &str) -> Self {
        Self {
            text: format!("{} {}", name, city),
            city: city.to_string(),
            category: category.to_string(),
        }
    }
}

/// Ordered list of queries swept by the pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub queries: Vec<SearchQuery>,
}

impl QueryPlan {
    /// Every category in every city, cities in the outer loop
    pub fn cities_by_categories(cities: &[String], categories: &[String]) -> Self {
        let queries = cities
            .iter()
            .flat_map(|city| {
                categories
                    .iter()
                    .map(move |category| SearchQuery::category_in_city(category, city))
            })
            .collect();
        Self { queries }
    }

    /// Named restaurants in one city
    pub fn named_restaurants(names: &[String], city: &str, category: &str) -> Self {
        let queries = names
            .iter()
            .map(|name| SearchQuery::named(name, city, category))
            .collect();
        Self { queries }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
