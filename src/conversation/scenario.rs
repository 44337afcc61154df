use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification tag attached to assistant turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Greeting,
    Hold,
    TechnicalSupport,
    FollowUp,
    Farewell,
    BusInfo,
    WasteInfo,
    LocationInfo,
    CityInfo,
    General,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Greeting => "greeting",
            Scenario::Hold => "hold",
            Scenario::TechnicalSupport => "technical_support",
            Scenario::FollowUp => "follow_up",
            Scenario::Farewell => "farewell",
            Scenario::BusInfo => "bus_info",
            Scenario::WasteInfo => "waste_info",
            Scenario::LocationInfo => "location_info",
            Scenario::CityInfo => "city_info",
            Scenario::General => "general",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a keyword matches against the words of a message
#[derive(Debug, Clone, Copy)]
enum Keyword {
    /// Whole word or phrase
    Word(&'static str),
    /// Any word starting with the stem ("strætó" matches "strætóstöð")
    Stem(&'static str),
}

use Keyword::{Stem, Word};

/// First match wins. The order is part of the behavior: "Hvar er næsta
/// strætóstöð?" is BusInfo, not LocationInfo, because bus keywords are
/// checked first. Overlaps between sets are resolved by this order only.
const RULES: &[(Scenario, &[Keyword])] = &[
    (
        Scenario::BusInfo,
        &[
            Stem("strætó"),
            Stem("strætisvagn"),
            Stem("vagn"),
            Stem("biðstöð"),
            Stem("stoppistöð"),
            Word("leið"),
            Stem("bus"),
        ],
    ),
    (
        Scenario::WasteInfo,
        &[
            Stem("sorp"),
            Stem("rusl"),
            Stem("endurvinnsl"),
            Stem("tunn"),
            Stem("grenndargám"),
            Word("waste"),
            Word("garbage"),
            Stem("recycl"),
        ],
    ),
    (
        Scenario::LocationInfo,
        &[
            Word("hvar"),
            Stem("staðsetn"),
            Stem("staður"),
            Stem("staðinn"),
            Stem("heimilisfang"),
            Stem("kort"),
            Word("where"),
            Stem("location"),
            Stem("address"),
        ],
    ),
    (
        Scenario::CityInfo,
        &[
            Stem("reykjavík"),
            Stem("borg"),
            Stem("þjónust"),
            Stem("leikskól"),
            Stem("grunnskól"),
            Stem("sundlaug"),
            Stem("fasteignagjöld"),
            Stem("menning"),
            Stem("viðburð"),
            Word("city"),
            Stem("service"),
        ],
    ),
    (
        Scenario::Greeting,
        &[
            Word("halló"),
            Word("hallo"),
            Word("hæ"),
            Word("hi"),
            Word("hello"),
            Word("góðan dag"),
            Word("góðan daginn"),
            Word("gott kvöld"),
            Word("sæl"),
            Word("sæll"),
            Word("sælir"),
        ],
    ),
    (
        Scenario::Farewell,
        &[
            Stem("bless"),
            Word("takk fyrir"),
            Word("sjáumst"),
            Word("goodbye"),
            Word("bye"),
        ],
    ),
    (
        Scenario::Hold,
        &[
            Word("bíddu"),
            Word("augnablik"),
            Stem("andartak"),
            Word("hold on"),
            Word("wait"),
        ],
    ),
    (
        Scenario::TechnicalSupport,
        &[
            Word("virkar ekki"),
            Stem("villa"),
            Stem("villu"),
            Stem("vandamál"),
            Stem("bilun"),
            Word("error"),
            Word("problem"),
            Word("not working"),
        ],
    ),
    (
        Scenario::FollowUp,
        &[
            Word("meira"),
            Word("annað"),
            Word("einnig"),
            Word("líka"),
            Word("more"),
            Word("also"),
            Word("what about"),
        ],
    ),
];

/// Lowercased words separated by single spaces, with a leading space
fn normalize(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len() + 1);
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        normalized.push(' ');
        normalized.extend(word.chars().flat_map(char::to_lowercase));
    }
    normalized
}

fn matches(normalized: &str, keyword: Keyword) -> bool {
    match keyword {
        Stem(stem) => normalized.contains(&format!(" {}", stem)),
        Word(word) => {
            let needle = format!(" {}", word);
            normalized.match_indices(&needle).any(|(i, _)| {
                let end = i + needle.len();
                end == normalized.len() || normalized[end..].starts_with(' ')
            })
        }
    }
}

/// Classify a message. Pure function of the text.
pub fn classify(text: &str) -> Scenario {
    let normalized = normalize(text);
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|&k| matches(&normalized, k)))
        .map(|(scenario, _)| *scenario)
        .unwrap_or(Scenario::General)
}

/// Greeting keywords anywhere in the message, regardless of rule order
pub fn contains_greeting(text: &str) -> bool {
    let normalized = normalize(text);
    RULES
        .iter()
        .filter(|(scenario, _)| *scenario == Scenario::Greeting)
        .any(|(_, keywords)| keywords.iter().any(|&k| matches(&normalized, k)))
}
