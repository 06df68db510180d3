use std::collections::VecDeque;
use tracing::debug;

use super::{ConversationTurn, IntentLabel, SessionState};

/// Number of recent turns considered by default
pub const DEFAULT_WINDOW: usize = 5;

/// Scores below this classify as `Unknown`
pub const DEFAULT_FLOOR: f64 = 0.3;

/// Score for a single matching word
const WORD_SCORE: f64 = 0.3;
/// Score for a matching multi-word phrase
const PHRASE_SCORE: f64 = 0.5;
/// Weight lost per older user turn
const DECAY: f64 = 0.5;

/// User turns of at most this many words count as short replies
const SHORT_REPLY_WORDS: usize = 2;
/// Consecutive short replies before they read as disengagement
const SHORT_REPLY_STREAK: usize = 3;

pub const DEFAULT_DISTRESS_KEYWORDS: &[&str] = &[
    "sad",
    "scared",
    "worried",
    "upset",
    "lonely",
    "hurt",
    "cry",
    "crying",
    "afraid",
    "nervous",
    "anxious",
    "feel bad",
    "nobody likes me",
    "nobody cares",
    "everyone hates me",
    "i hate myself",
    "want to die",
    "being bullied",
    "makes fun of me",
    "hitting me",
    "hurts me",
    "scared at home",
    "keep it secret",
];

pub const DEFAULT_DISENGAGEMENT_KEYWORDS: &[&str] = &[
    "bored",
    "boring",
    "whatever",
    "bye",
    "goodbye",
    "meh",
    "stop",
    "don't care",
    "don't want to",
    "leave me alone",
    "go away",
    "not fun",
    "i'm done",
];

pub const DEFAULT_OFF_TOPIC_KEYWORDS: &[&str] = &[
    "gun",
    "weapon",
    "kill",
    "violence",
    "murder",
    "bomb",
    "stab",
    "password",
    "money",
    "credit card",
    "bank account",
    "dating",
    "sex",
    "kissing",
    "election",
    "president",
    "political party",
    "alcohol",
    "drugs",
    "cigarette",
    "beer",
    "wine",
    "vape",
    "horror",
    "blood",
    "gore",
    "scary movie",
];

pub const DEFAULT_ON_TOPIC_KEYWORDS: &[&str] = &[
    "play",
    "game",
    "fun",
    "joke",
    "pretend",
    "imagine",
    "learn",
    "teach",
    "practice",
    "lesson",
    "explain",
    "show me",
    "how to",
    "story",
    "tell me a story",
    "once upon",
    "adventure",
    "explore",
    "discover",
    "curious",
    "wonder",
    "draw",
    "drawing",
    "animals",
    "space",
    "math",
    "science",
    "reading",
    "sing",
    "song",
];

/// A single intent heuristic
///
/// Rules see the classifier window oldest first and return a score in [0, 1].
/// Scores outside that range are clamped.
pub trait IntentRule: Send + Sync {
    fn label(&self) -> IntentLabel;
    fn score(&self, turns: &[ConversationTurn]) -> f64;
}

/// Classifier tunables
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSettings {
    pub window: usize,
    pub floor: f64,
    pub off_topic_keywords: Vec<String>,
    pub on_topic_keywords: Vec<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            floor: DEFAULT_FLOOR,
            off_topic_keywords: to_strings(DEFAULT_OFF_TOPIC_KEYWORDS),
            on_topic_keywords: to_strings(DEFAULT_ON_TOPIC_KEYWORDS),
        }
    }
}

/// Rule-based conversation classifier over a bounded turn window
///
/// Identical turn sequences always produce identical states.
pub struct IntentClassifier {
    window: VecDeque<ConversationTurn>,
    capacity: usize,
    floor: f64,
    rules: Vec<Box<dyn IntentRule>>,
    state: Option<SessionState>,
}

impl IntentClassifier {
    /// Classifier with the built-in rules
    pub fn new(settings: ClassifierSettings) -> Self {
        let rules = default_rules(&settings);
        Self::with_rules(settings, rules)
    }

    /// Classifier with only the given rules
    pub fn with_rules(settings: ClassifierSettings, rules: Vec<Box<dyn IntentRule>>) -> Self {
        let capacity = settings.window.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            floor: settings.floor,
            rules,
            state: None,
        }
    }

    /// Add a rule alongside the existing ones
    pub fn with_rule(mut self, rule: Box<dyn IntentRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Push a turn and reclassify the window
    pub fn observe(&mut self, turn: ConversationTurn) -> SessionState {
        let detected_at = turn.timestamp;

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(turn);

        let turns: &[ConversationTurn] = self.window.make_contiguous();
        let best = self
            .rules
            .iter()
            .map(|rule| {
                let score = rule.score(turns);
                let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
                (rule.label(), score)
            })
            .max_by(|a, b| {
                a.1.total_cmp(&b.1)
                    .then_with(|| a.0.priority().cmp(&b.0.priority()))
            });

        // Below the floor the top score is still reported as confidence
        let state = match best {
            Some((label, score)) if score >= self.floor => SessionState::new(label, score, detected_at),
            Some((_, score)) => SessionState::new(IntentLabel::Unknown, score, detected_at),
            None => SessionState::unknown(detected_at),
        };

        if self.state.map(|s| s.current_intent) != Some(state.current_intent) {
            debug!(
                "Session intent: {} ({:.2})",
                state.current_intent, state.confidence
            );
        }

        self.state = Some(state);
        state
    }

    /// Latest classification, if any turn was observed
    pub fn state(&self) -> Option<SessionState> {
        self.state
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.window.iter()
    }

    /// Forget the window for a new session
    pub fn reset(&mut self) {
        self.window.clear();
        self.state = None;
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(ClassifierSettings::default())
    }
}

/// The built-in rule set
pub fn default_rules(settings: &ClassifierSettings) -> Vec<Box<dyn IntentRule>> {
    vec![
        Box::new(KeywordRule::new(
            IntentLabel::Distress,
            DEFAULT_DISTRESS_KEYWORDS.iter().copied(),
            2.0,
        )) as Box<dyn IntentRule>,
        Box::new(DisengagementRule::new()),
        Box::new(RepetitionRule),
        Box::new(KeywordRule::new(
            IntentLabel::OffTopic,
            settings.off_topic_keywords.iter().map(String::as_str),
            1.5,
        )),
        Box::new(KeywordRule::new(
            IntentLabel::OnTopic,
            settings.on_topic_keywords.iter().map(String::as_str),
            1.0,
        )),
    ]
}

/// Vocabulary match over user turns, newest turn weighted highest
pub struct KeywordRule {
    label: IntentLabel,
    keywords: Vec<String>,
    weight: f64,
}

impl KeywordRule {
    pub fn new<'a>(label: IntentLabel, keywords: impl IntoIterator<Item = &'a str>, weight: f64) -> Self {
        let keywords = keywords
            .into_iter()
            .map(normalize)
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            label,
            keywords,
            weight,
        }
    }
}

impl IntentRule for KeywordRule {
    fn label(&self) -> IntentLabel {
        self.label
    }

    fn score(&self, turns: &[ConversationTurn]) -> f64 {
        (decayed_keyword_score(turns, &self.keywords) * self.weight).min(1.0)
    }
}

/// Dismissive replies, or a run of very short ones
struct DisengagementRule {
    keywords: KeywordRule,
}

impl DisengagementRule {
    fn new() -> Self {
        Self {
            keywords: KeywordRule::new(
                IntentLabel::Disengagement,
                DEFAULT_DISENGAGEMENT_KEYWORDS.iter().copied(),
                1.5,
            ),
        }
    }
}

impl IntentRule for DisengagementRule {
    fn label(&self) -> IntentLabel {
        IntentLabel::Disengagement
    }

    fn score(&self, turns: &[ConversationTurn]) -> f64 {
        let streak = turns
            .iter()
            .rev()
            .filter(|t| t.is_user())
            .take_while(|t| normalize(&t.text).split_whitespace().count() <= SHORT_REPLY_WORDS)
            .count();

        let streak_score = if streak >= SHORT_REPLY_STREAK {
            (0.2 * streak as f64).min(1.0)
        } else {
            0.0
        };

        self.keywords.score(turns).max(streak_score)
    }
}

/// The latest user utterance repeated within the window
struct RepetitionRule;

impl IntentRule for RepetitionRule {
    fn label(&self) -> IntentLabel {
        IntentLabel::Repetition
    }

    fn score(&self, turns: &[ConversationTurn]) -> f64 {
        let mut utterances = turns.iter().filter(|t| t.is_user()).map(|t| normalize(&t.text));

        let Some(latest) = utterances.next_back() else {
            return 0.0;
        };
        if latest.is_empty() {
            return 0.0;
        }

        let count = 1 + utterances.filter(|u| *u == latest).count();
        if count < 2 {
            return 0.0;
        }

        (0.4 + 0.2 * (count - 1) as f64).min(1.0)
    }
}

fn decayed_keyword_score(turns: &[ConversationTurn], keywords: &[String]) -> f64 {
    turns
        .iter()
        .rev()
        .filter(|t| t.is_user())
        .enumerate()
        .map(|(age, turn)| keyword_score(&normalize(&turn.text), keywords) * DECAY.powi(age as i32))
        .sum()
}

/// Sum of word and phrase matches in already-normalized text
fn keyword_score(text: &str, keywords: &[String]) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let words: Vec<&str> = text.split(' ').collect();
    let padded = format!(" {} ", text);

    keywords
        .iter()
        .map(|keyword| {
            if keyword.contains(' ') {
                if padded.contains(&format!(" {} ", keyword)) {
                    PHRASE_SCORE
                } else {
                    0.0
                }
            } else if words.contains(&keyword.as_str()) {
                WORD_SCORE
            } else {
                0.0
            }
        })
        .sum()
}

/// Lowercase, drop apostrophes, turn other punctuation into spaces
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}
