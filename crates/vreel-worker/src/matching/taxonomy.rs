//! Fixed taxonomy of hospitality themes.

/// Theme name and the keywords that signal it.
pub const CATEGORIES: [(&str, &[&str]); 10] = [
    ("pool", &["pool", "swim", "swimming", "infinity", "poolside", "lounger", "jacuzzi", "hot tub"]),
    ("room", &["room", "bedroom", "suite", "bed", "bathroom", "balcony", "king", "queen", "villa"]),
    ("dining", &["dining", "restaurant", "breakfast", "dinner", "lunch", "food", "buffet", "chef", "kitchen", "meal"]),
    ("spa", &["spa", "massage", "sauna", "treatment", "wellness", "steam", "hammam"]),
    ("view", &["view", "panorama", "panoramic", "skyline", "sunset", "sunrise", "horizon", "vista", "overlook"]),
    ("exterior", &["exterior", "facade", "entrance", "building", "garden", "courtyard", "driveway", "aerial", "drone"]),
    ("lobby", &["lobby", "reception", "foyer", "concierge", "check-in", "lounge"]),
    ("beach", &["beach", "sand", "ocean", "sea", "shore", "waves", "coast", "surf"]),
    ("gym", &["gym", "fitness", "workout", "treadmill", "weights", "yoga"]),
    ("bar", &["bar", "cocktail", "cocktails", "drinks", "wine", "rooftop", "bartender", "pub"]),
];

/// Categories whose keywords appear in `text`, in taxonomy order.
///
/// Single-word keywords must match a whole token; multi-word keywords match
/// as a phrase.
pub fn categories_of(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty())
        .collect();

    CATEGORIES
        .iter()
        .filter(|(_, keywords)| {
            keywords.iter().any(|k| {
                if k.contains(' ') {
                    lower.contains(k)
                } else {
                    tokens.iter().any(|t| t == k)
                }
            })
        })
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_of() {
        assert_eq!(categories_of("Swimming pool view"), vec!["pool", "view"]);
        assert_eq!(categories_of("Bedroom suite"), vec!["room"]);
        assert_eq!(categories_of("guests relax in the hot tub"), vec!["pool"]);
        assert!(categories_of("parking").is_empty());
        // substrings of other words do not count
        assert!(categories_of("barrel").is_empty());
    }
}
