//! Screen recognition.
//!
//! The session driver needs a stable type tag for every screen it branches
//! on. Recognition is pluggable — different host dialects (production,
//! training, vendor variants) ship their own [`ScreenClassifier`] — and the
//! built-in engine is a rule table rather than a wall of if/else: each rule
//! matches the title line exactly, by prefix, or by its word shape, with an
//! optional secondary probe for ambiguous headers.

use regex::Regex;
use tracing::{debug, warn};

/// Tag assigned when no rule matches.
pub const UNKNOWN: &str = "UNKNOWN";
/// Tag assigned when the screen has no usable title line.
pub const NO_TITLE: &str = "ERROR/NO_TITLE";

// ── Classification ────────────────────────────────────────────────────────

/// What the classifier concluded about a rendered screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Stable screen-type tag.
    pub kind: String,
    /// Menu options parsed from the option line.
    pub options: Vec<String>,
    /// The raw option line.
    pub option_str: String,
    /// Content of the `<X>` default-option marker.
    pub default_option: String,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            kind: UNKNOWN.to_owned(),
            options: Vec::new(),
            option_str: String::new(),
            default_option: "^".to_owned(),
        }
    }
}

/// Inspects rendered lines and assigns a screen type plus menu options.
pub trait ScreenClassifier {
    fn classify(&self, lines: &[String]) -> Classification;
}

// ── Rule table ────────────────────────────────────────────────────────────

/// How a rule matches the title line.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Title equals the string exactly.
    Exact(&'static str),
    /// Title starts with the string.
    Prefix(&'static str),
    /// Title's first word and second-to-last word match — the shape of the
    /// host's menu banners, whose middles carry variable session text.
    WordPair {
        first: &'static str,
        second_last: &'static str,
    },
}

impl Matcher {
    fn matches(&self, title: &str) -> bool {
        match *self {
            Matcher::Exact(s) => title == s,
            Matcher::Prefix(s) => title.starts_with(s),
            Matcher::WordPair { first, second_last } => {
                let words: Vec<&str> = title.split_whitespace().collect();
                words.len() >= 2
                    && words[0] == first
                    && words[words.len() - 2] == second_last
            }
        }
    }
}

/// Secondary field-presence test refining an ambiguous title.
#[derive(Debug, Clone)]
pub struct Probe {
    /// Line to inspect.
    pub line: usize,
    /// Word index within that line.
    pub word: usize,
    /// Expected word.
    pub equals: &'static str,
    /// Tag to assign when the probe hits.
    pub refined: &'static str,
}

/// One classification rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: Matcher,
    pub tag: &'static str,
    pub probe: Option<Probe>,
}

impl Rule {
    pub fn new(matcher: Matcher, tag: &'static str) -> Self {
        Self { matcher, tag, probe: None }
    }

    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = Some(probe);
        self
    }
}

/// Table-driven classifier.
///
/// The title line (by convention the second screen line) is checked against
/// each rule in order; the first match wins, then its probe may refine the
/// tag. The option line is the last screen line, options separated by `\`
/// or `|`, with the default option marked `<X>` inside the final entry.
#[derive(Debug)]
pub struct TableClassifier {
    rules: Vec<Rule>,
    /// Index of the title line.
    title_line: usize,
    default_marker: Regex,
}

impl TableClassifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            title_line: 1,
            default_marker: Regex::new(r"<([A-Z]+)>").unwrap(),
        }
    }

    /// Use a different line as the title (some dialects banner on line 0).
    pub fn with_title_line(mut self, line: usize) -> Self {
        self.title_line = line;
        self
    }

    fn parse_options(&self, lines: &[String], out: &mut Classification) {
        let Some(last) = lines.last() else { return };
        out.option_str = last.trim().to_owned();
        out.options = out
            .option_str
            .split(['\\', '|'])
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_owned)
            .collect();
        // The final option usually embeds the default, e.g. "Accept <A>".
        let Some(final_opt) = out.options.last_mut() else { return };
        if let Some(caps) = self.default_marker.captures(final_opt) {
            out.default_option = caps[1].to_owned();
            if let Some(marker) = final_opt.find('<') {
                *final_opt = final_opt[..marker].trim_end().to_owned();
            }
        }
    }
}

impl ScreenClassifier for TableClassifier {
    fn classify(&self, lines: &[String]) -> Classification {
        let mut out = Classification::default();
        if lines.len() < 2 {
            warn!(lines = lines.len(), "screen too short to classify");
            return out;
        }
        self.parse_options(lines, &mut out);

        let title = lines
            .get(self.title_line)
            .map(|l| l.trim())
            .unwrap_or_default();
        if title.is_empty() {
            debug!("screen has no title line; merge problem or host error?");
            out.kind = NO_TITLE.to_owned();
            return out;
        }

        for rule in &self.rules {
            if !rule.matcher.matches(title) {
                continue;
            }
            out.kind = rule.tag.to_owned();
            if let Some(probe) = &rule.probe {
                let word = lines
                    .get(probe.line)
                    .map(|l| l.split_whitespace().nth(probe.word).unwrap_or(""))
                    .unwrap_or("");
                if word == probe.equals {
                    out.kind = probe.refined.to_owned();
                }
            }
            debug!(kind = %out.kind, "screen classified");
            return out;
        }

        warn!(title, "could not identify screen");
        out
    }
}

// ── Default dialect ───────────────────────────────────────────────────────

/// Rule table for the stock host dialect.
///
/// Main-menu banners look like `Line 1 for <user> ... [CHM] <date>` — the
/// middle is variable, so they match on word shape. `[CHM]` is the live
/// module, `[CHT]` its training twin.
pub fn default_dialect() -> TableClassifier {
    TableClassifier::new(vec![
        Rule::new(
            Matcher::WordPair { first: "Line", second_last: "[CHM]" },
            "MainMenu",
        ),
        Rule::new(
            Matcher::WordPair { first: "Line", second_last: "[CHT]" },
            "MainMenuTraining",
        ),
        Rule::new(
            Matcher::Exact("Specimen Enquiry. Screen 1 / Select specimen"),
            "SpecimenEnquiry",
        ),
        Rule::new(
            Matcher::Prefix("Specimen enquiry. Display results"),
            "SpecimenResults",
        ),
        Rule::new(
            Matcher::Exact("Specimen Enquiry. Screen 3 / further set information"),
            "SpecimenSetInfo",
        ),
        Rule::new(Matcher::Exact("Specimen note pad maintenance"), "SpecimenNotepad"),
        Rule::new(Matcher::Exact("Patient enquiry"), "PatientEnquiry"),
        Rule::new(Matcher::Exact("Patient demographics"), "PatientDemographics"),
        Rule::new(Matcher::Exact("Set Definition"), "SetMaintenance"),
        Rule::new(Matcher::Exact("Set Definition - Amend"), "SetMaintenanceAmend"),
        Rule::new(
            Matcher::Exact("Set Definition - Component tests"),
            "SetMaintenanceTests",
        ),
        Rule::new(
            Matcher::Exact("Authorisation group rule definition"),
            "AuthQueueRules",
        ),
        Rule::new(
            Matcher::Prefix("Authorisation group rule definition for"),
            "AuthQueueRuleSet",
        ),
        Rule::new(
            Matcher::Exact("Authorization Intervention - Definition"),
            "AuthIntervention",
        ),
        Rule::new(
            Matcher::Exact("Authorization Intervention - Definition - Set"),
            "AuthInterventionSet",
        ),
        Rule::new(
            Matcher::Exact("Auto comment / Further work / Tel. list routine setup"),
            "AutoComments",
        ),
        Rule::new(Matcher::Exact("Work beyond its turn around time"), "OverdueWork")
            .with_probe(Probe {
                line: 3,
                word: 0,
                equals: "Entry",
                refined: "OverdueWorkData",
            }),
        Rule::new(Matcher::Exact("Audit Trail Information"), "AuditTrail"),
        Rule::new(
            Matcher::Exact("Enter/edit user i.d.'s and privileges"),
            "UserMaintenance",
        ),
        Rule::new(Matcher::Prefix("Request:"), "ResultEntry"),
        Rule::new(Matcher::Exact("ON-CALL?"), "OnCallPrompt"),
        Rule::new(Matcher::Prefix("Password expired"), "ChangePassword"),
        Rule::new(Matcher::Prefix("You must change your password"), "ChangePassword"),
    ])
}

// ── Tests ─────────────────────────────────────────────────────────────────
