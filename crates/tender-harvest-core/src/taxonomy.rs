//! Keyword taxonomy classifier.
//!
//! Assigns a category key to a tender from its title and description using
//! layered keyword rules over normalized text. The decision procedure, in
//! order, first match wins:
//!
//! 1. **Exclusion**: any exclusion keyword → default category.
//! 2. **Strong signal**: any strong keyword → target category.
//! 3. **Weighted**: with `P` distinct primary matches and `S` distinct
//!    secondary matches (plus one if any contextual hint matches), the target
//!    category is assigned when `P > 0 && (P > 1 || S > 0)`.
//!
//! Text and keywords are normalized the same way ([`normalize_text`]):
//! lowercased, diacritics folded to base Latin letters, and every run of
//! non-alphanumeric characters collapsed to one space. Keywords only match on
//! word boundaries, so `ram` does not match inside `program`.
//!
//! # Example
//!
//! ```rust
//! use tender_harvest_core::taxonomy::{Taxonomy, DEFAULT_CATEGORY, IT_CATEGORY};
//!
//! let taxonomy = Taxonomy::builtin();
//! assert_eq!(taxonomy.classify("Yeni Nesil Güvenlik Duvarı Alımı", ""), IT_CATEGORY);
//! assert_eq!(taxonomy.classify("MADENİ YAĞ ALIMI", ""), DEFAULT_CATEGORY);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key of the catch-all category.
pub const DEFAULT_CATEGORY: &str = "diger";

/// Key of the built-in target category (IT and security).
pub const IT_CATEGORY: &str = "bilisim_teknolojileri";

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("failed to parse taxonomy: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid taxonomy: {0}")]
    Invalid(String),
}

/// Keyword lists for the target category, as written in a taxonomy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRules {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub strong: Vec<String>,
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// On-disk taxonomy layout.
///
/// ```toml
/// default_key = "diger"
/// default_name = "Diğer"
///
/// [target]
/// key = "bilisim_teknolojileri"
/// name = "Bilişim & Güvenlik"
/// strong = ["güvenlik duvarı"]
/// primary = ["sunucu", "switch"]
/// secondary = ["kurulum"]
/// hints = ["bilgi işlem"]
/// exclude = ["yakıt"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyFile {
    #[serde(default = "default_key")]
    pub default_key: String,
    #[serde(default = "default_name")]
    pub default_name: String,
    pub target: CategoryRules,
}

fn default_key() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_name() -> String {
    "📦 Diğer".to_string()
}

/// Which rule produced a classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Decision {
    Excluded { keyword: String },
    StrongSignal { keyword: String },
    Weighted { primary: usize, secondary: usize },
}

/// Classification of one text, with the rule that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: String,
    pub decision: Decision,
}

/// A compiled keyword list: normalized, deduplicated, sorted.
#[derive(Debug, Clone)]
struct KeywordSet {
    needles: Vec<String>,
}

impl KeywordSet {
    fn new(keywords: &[String]) -> Self {
        let mut needles: Vec<String> = keywords
            .iter()
            .map(|k| normalize_text(k))
            .filter(|k| !k.is_empty())
            .map(|k| format!(" {} ", k))
            .collect();
        needles.sort();
        needles.dedup();
        Self { needles }
    }

    fn first_match(&self, haystack: &str) -> Option<String> {
        self.needles
            .iter()
            .find(|n| haystack.contains(n.as_str()))
            .map(|n| n.trim().to_string())
    }

    fn count_matches(&self, haystack: &str) -> usize {
        self.needles
            .iter()
            .filter(|n| haystack.contains(n.as_str()))
            .count()
    }

    /// `haystack` with every matched keyword blanked out. Needles carry
    /// their own boundary spaces, so one space keeps the neighbours apart.
    fn without_matches(&self, haystack: &str) -> String {
        self.needles
            .iter()
            .fold(haystack.to_string(), |rest, n| rest.replace(n.as_str(), " "))
    }
}

/// The compiled classifier.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    default_key: String,
    default_name: String,
    target_key: String,
    target_name: String,
    strong: KeywordSet,
    primary: KeywordSet,
    secondary: KeywordSet,
    hints: KeywordSet,
    exclude: KeywordSet,
}

impl Taxonomy {
    /// Compile a taxonomy from its keyword lists.
    pub fn new(file: &TaxonomyFile) -> Result<Self, TaxonomyError> {
        if file.target.key.trim().is_empty() {
            return Err(TaxonomyError::Invalid("target.key must not be empty".into()));
        }
        if file.target.key == file.default_key {
            return Err(TaxonomyError::Invalid(format!(
                "target.key '{}' must differ from default_key",
                file.target.key
            )));
        }
        if file.target.primary.is_empty() && file.target.strong.is_empty() {
            return Err(TaxonomyError::Invalid(
                "target needs at least one primary or strong keyword".into(),
            ));
        }

        Ok(Self {
            default_key: file.default_key.clone(),
            default_name: file.default_name.clone(),
            target_key: file.target.key.clone(),
            target_name: file.target.name.clone(),
            strong: KeywordSet::new(&file.target.strong),
            primary: KeywordSet::new(&file.target.primary),
            secondary: KeywordSet::new(&file.target.secondary),
            hints: KeywordSet::new(&file.target.hints),
            exclude: KeywordSet::new(&file.target.exclude),
        })
    }

    /// Parse and compile a taxonomy from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, TaxonomyError> {
        let file: TaxonomyFile = toml::from_str(content)?;
        Self::new(&file)
    }

    /// The built-in IT & security taxonomy.
    pub fn builtin() -> Self {
        // The built-in lists always satisfy `new`'s checks.
        match Self::new(&builtin_file()) {
            Ok(t) => t,
            Err(e) => unreachable!("built-in taxonomy is invalid: {e}"),
        }
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    /// All `(key, display name)` pairs, target first.
    pub fn categories(&self) -> Vec<(String, String)> {
        vec![
            (self.target_key.clone(), self.target_name.clone()),
            (self.default_key.clone(), self.default_name.clone()),
        ]
    }

    /// Display name for a key; unknown keys map to the default category's name.
    pub fn category_name(&self, key: &str) -> &str {
        if key == self.target_key {
            &self.target_name
        } else {
            &self.default_name
        }
    }

    /// Classify a tender and return its category key.
    pub fn classify(&self, title: &str, description: &str) -> &str {
        if self.decide(title, description).0 {
            &self.target_key
        } else {
            &self.default_key
        }
    }

    /// Classify a tender and report which rule decided it.
    pub fn explain(&self, title: &str, description: &str) -> Classification {
        let (is_target, decision) = self.decide(title, description);
        let category = if is_target {
            self.target_key.clone()
        } else {
            self.default_key.clone()
        };
        Classification { category, decision }
    }

    fn decide(&self, title: &str, description: &str) -> (bool, Decision) {
        let haystack = format!(" {} ", normalize_text(&format!("{title} {description}")));

        if let Some(keyword) = self.exclude.first_match(&haystack) {
            return (false, Decision::Excluded { keyword });
        }

        if let Some(keyword) = self.strong.first_match(&haystack) {
            return (true, Decision::StrongSignal { keyword });
        }

        // Corroborating evidence must come from text outside the primary
        // matches: "veri merkezi" is one primary, not a primary plus "veri".
        let primary = self.primary.count_matches(&haystack);
        let rest = self.primary.without_matches(&haystack);
        let mut secondary = self.secondary.count_matches(&rest);
        if self.hints.first_match(&rest).is_some() {
            secondary += 1;
        }

        let is_target = primary > 0 && (primary > 1 || secondary > 0);
        (is_target, Decision::Weighted { primary, secondary })
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase, fold diacritics, and collapse non-alphanumerics to single spaces.
///
/// ```rust
/// use tender_harvest_core::taxonomy::normalize_text;
///
/// assert_eq!(normalize_text("MADENİ  Yağ, ALIMI!"), "madeni yag alimi");
/// assert_eq!(normalize_text("Güvenlik-Duvarı"), "guvenlik duvari");
/// ```
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if is_combining_mark(ch) {
            continue;
        }
        let folded = fold_diacritic(ch);
        for c in folded.chars() {
            if c.is_alphanumeric() {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            } else {
                pending_space = true;
            }
        }
    }

    out
}

fn is_combining_mark(ch: char) -> bool {
    matches!(ch, '\u{0300}'..='\u{036F}')
}

fn fold_diacritic(ch: char) -> String {
    let folded = match ch {
        'ç' | 'ć' | 'č' => "c",
        'ğ' => "g",
        'ı' | 'î' | 'í' | 'ì' | 'ï' => "i",
        'ö' | 'ô' | 'ó' | 'ò' | 'õ' | 'ø' => "o",
        'ş' | 'ś' | 'š' => "s",
        'ü' | 'û' | 'ú' | 'ù' => "u",
        'â' | 'á' | 'à' | 'ä' | 'ã' | 'å' => "a",
        'é' | 'è' | 'ê' | 'ë' | 'ě' => "e",
        'ñ' | 'ń' => "n",
        'ý' | 'ÿ' => "y",
        'ž' | 'ź' | 'ż' => "z",
        'ř' => "r",
        'ł' => "l",
        'đ' => "d",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        other => return other.to_string(),
    };
    folded.to_string()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Keyword lists of the built-in taxonomy.
pub fn builtin_file() -> TaxonomyFile {
    TaxonomyFile {
        default_key: DEFAULT_CATEGORY.to_string(),
        default_name: default_name(),
        target: CategoryRules {
            key: IT_CATEGORY.to_string(),
            name: "💻 Bilişim & Güvenlik".to_string(),
            strong: words(&[
                "güvenlik duvarı",
                "firewall",
                "siber güvenlik",
                "siber saldırı",
                "sızma testi",
                "penetrasyon testi",
                "siem",
                "soar",
                "xdr",
                "edr",
                "ndr",
                "ddos",
                "antivirüs",
                "antivirus",
                "zafiyet tarama",
                "tehdit istihbaratı",
            ]),
            primary: words(&[
                // general IT
                "bilgisayar",
                "bilişim",
                "yazılım",
                "donanım",
                "network",
                "server",
                "sunucu",
                "veri merkezi",
                "datacenter",
                // hardware
                "masaüstü",
                "laptop",
                "dizüstü",
                "işlemci",
                "cpu",
                "ram",
                "bellek",
                "harddisk",
                "ssd",
                "hdd",
                "anakart",
                "ekran kartı",
                "gpu",
                "monitör",
                "ups",
                "printer",
                // software
                "microsoft",
                "windows",
                "linux",
                "oracle",
                "sql",
                "erp",
                "crm",
                "lisans",
                // network
                "switch",
                "router",
                "modem",
                "access point",
                "fiber",
                "cat6",
                "cat7",
                // physical security systems
                "kamera sistemi",
                "cctv",
                "ip kamera",
                "nvr",
                "dvr",
                "kartlı geçiş",
                "yüz tanıma",
            ]),
            secondary: words(&[
                "sistem",
                "altyapı",
                "ağ",
                "elektronik",
                "digital",
                "dijital",
                "teknoloji",
                "yazıcı",
                "tarayıcı",
                "scanner",
                "kablolama",
                "kurulum",
                "güncelleme",
                "yedekleme",
                "bakım",
                "onarım",
                "teknik servis",
                "it",
                "bt",
            ]),
            hints: words(&[
                "bilgi işlem",
                "bilgi teknolojileri",
                "bilgi güvenliği",
                "siber",
                "veri",
            ]),
            exclude: words(&[
                "fuel",
                "kalyak",
                "yakıt",
                "akaryakıt",
                "petrol",
                "lpg",
                "doğalgaz",
                "madeni yağ",
                "mutfak",
                "yemek",
                "gıda",
                "temizlik",
                "kırtasiye",
                "mobilya",
                "taşınmaz",
                "gayrimenkul",
                "arsa",
                "bina",
                "inşaat",
                "tadilat",
                "malzeme",
                "hırdavat",
                "tekstil",
                "giyim",
                "kıyafet",
                "ilaç",
                "tıbbi",
                "medikal",
                "araç",
                "vasıta",
                "otomobil",
            ]),
        },
    }
}
