use crate::error::{ClassifyError, ModelError};
use crate::models::{ClassificationResult, ClassifyMethod, Language, MethodDetails};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Inference capability backing the statistical methods. Implementations
/// are loaded once, treated as read-only and shared across concurrent
/// classifications.
#[async_trait]
pub trait ScriptModel: Send + Sync {
    /// Per-language probabilities for a short text span. Softmax output,
    /// one entry per supported language.
    async fn predict(&self, text: &str) -> Result<Vec<(Language, f32)>, ModelError>;
}

/// Sanskrit-only function words. Tokens are matched exactly after
/// stripping danda and common punctuation.
const SANSKRIT_FUNCTION_WORDS: &[&str] = &[
    "इति", "एव", "अपि", "हि", "खलु", "अथ", "स्म", "चैव", "भवति", "अस्ति", "तस्मात्",
    "यथा", "एवम्", "सः", "एषः", "इदम्", "तत्र", "यत्र", "पुनः", "नमः", "उवाच",
];

/// Substring patterns rare in Hindi prose but routine in Sanskrit:
/// visarga, avagraha, genitive/ablative endings and dense conjuncts.
const SANSKRIT_MARKERS: &[&str] = &["ः", "ऽ", "स्य", "त्व", "भ्य", "श्च", "ेषु", "ाणाम्"];

const SANSKRIT_SIGNAL_FLOOR: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    /// Hybrid short-circuits when the rule-based confidence reaches this.
    pub short_circuit_threshold: f32,
    /// Confidences within this of the best are considered tied.
    pub tie_epsilon: f32,
    /// Method whose candidate wins a hybrid tie. Rule-based by default:
    /// it is the cheapest and fully deterministic.
    pub tie_break: ClassifyMethod,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            short_circuit_threshold: 0.9,
            tie_epsilon: 0.05,
            tie_break: ClassifyMethod::RuleBased,
        }
    }
}

/// Multi-method Hindi / Gujarati / Sanskrit classifier. Models are
/// injected; a missing model fails only the calls that need it.
pub struct LanguageClassifier {
    fasttext: Option<Arc<dyn ScriptModel>>,
    indicbert: Option<Arc<dyn ScriptModel>>,
    options: ClassifierOptions,
}

impl LanguageClassifier {
    pub fn new(
        fasttext: Option<Arc<dyn ScriptModel>>,
        indicbert: Option<Arc<dyn ScriptModel>>,
        options: ClassifierOptions,
    ) -> Self {
        Self {
            fasttext,
            indicbert,
            options,
        }
    }

    pub fn rule_based_only() -> Self {
        Self::new(None, None, ClassifierOptions::default())
    }

    pub async fn classify(
        &self,
        text: &str,
        method: ClassifyMethod,
    ) -> Result<ClassificationResult, ClassifyError> {
        if text.trim().is_empty() {
            return Err(ClassifyError::InvalidInput(
                "text is empty or whitespace-only".to_string(),
            ));
        }

        match method {
            ClassifyMethod::RuleBased => Ok(rule_based(text)),
            ClassifyMethod::Fasttext => {
                self.model_classify(text, ClassifyMethod::Fasttext).await
            }
            ClassifyMethod::IndicBert => {
                self.model_classify(text, ClassifyMethod::IndicBert).await
            }
            ClassifyMethod::Hybrid => self.hybrid_classify(text).await,
        }
    }

    /// Classifies many short lines, isolating per-item failures: one
    /// unavailable model must not abort the remaining items.
    pub async fn classify_batch(
        &self,
        lines: &[String],
        method: ClassifyMethod,
    ) -> Vec<Result<ClassificationResult, ClassifyError>> {
        let mut results = Vec::with_capacity(lines.len());
        for line in lines {
            results.push(self.classify(line, method).await);
        }
        results
    }

    fn model_for(&self, method: ClassifyMethod) -> Result<Arc<dyn ScriptModel>, ClassifyError> {
        let slot = match method {
            ClassifyMethod::Fasttext => self.fasttext.clone(),
            ClassifyMethod::IndicBert => self.indicbert.clone(),
            _ => None,
        };
        slot.ok_or_else(|| {
            ClassifyError::Model(ModelError::Unavailable {
                model: method.to_string(),
                details: "model not loaded".to_string(),
            })
        })
    }

    async fn model_classify(
        &self,
        text: &str,
        method: ClassifyMethod,
    ) -> Result<ClassificationResult, ClassifyError> {
        let model = self.model_for(method)?;
        let probabilities = model.predict(text).await.map_err(ClassifyError::Model)?;

        let (language, confidence) = top_label(&probabilities).ok_or_else(|| {
            ClassifyError::Model(ModelError::InvalidResponse {
                model: method.to_string(),
                details: "empty probability vector".to_string(),
            })
        })?;

        Ok(ClassificationResult {
            text: text.to_string(),
            language,
            confidence,
            method,
            details: MethodDetails::ModelScores { probabilities },
        })
    }

    async fn hybrid_classify(&self, text: &str) -> Result<ClassificationResult, ClassifyError> {
        let rule = rule_based(text);

        if rule.confidence >= self.options.short_circuit_threshold {
            return Ok(ClassificationResult {
                text: text.to_string(),
                language: rule.language,
                confidence: rule.confidence,
                method: ClassifyMethod::Hybrid,
                details: MethodDetails::HybridTrace {
                    short_circuited: true,
                    consulted: vec![ClassifyMethod::RuleBased],
                },
            });
        }

        let mut candidates = vec![(ClassifyMethod::RuleBased, rule.language, rule.confidence)];
        let mut consulted = vec![ClassifyMethod::RuleBased];

        for method in [ClassifyMethod::Fasttext, ClassifyMethod::IndicBert] {
            // A model that failed to load degrades hybrid to the
            // remaining methods instead of failing the call.
            if let Ok(result) = self.model_classify(text, method).await {
                candidates.push((method, result.language, result.confidence));
                consulted.push(method);
            }
        }

        let best = candidates
            .iter()
            .cloned()
            .max_by(|left, right| left.2.total_cmp(&right.2))
            .unwrap_or((ClassifyMethod::RuleBased, rule.language, rule.confidence));

        let tied = candidates
            .iter()
            .find(|(method, _, confidence)| {
                *method == self.options.tie_break
                    && (best.2 - confidence).abs() <= self.options.tie_epsilon
            })
            .cloned();

        let (_, language, confidence) = tied.unwrap_or(best);

        Ok(ClassificationResult {
            text: text.to_string(),
            language,
            confidence,
            method: ClassifyMethod::Hybrid,
            details: MethodDetails::HybridTrace {
                short_circuited: false,
                consulted,
            },
        })
    }
}

fn top_label(probabilities: &[(Language, f32)]) -> Option<(Language, f32)> {
    probabilities
        .iter()
        .cloned()
        .max_by(|left, right| left.1.total_cmp(&right.1))
}

fn is_devanagari(ch: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&ch)
}

fn is_gujarati(ch: char) -> bool {
    ('\u{0A80}'..='\u{0AFF}').contains(&ch)
}

/// Deterministic script/marker heuristics. Gujarati is decided by script
/// block; Hindi vs Sanskrit by Sanskrit-exclusive marker and function-word
/// density. Hindi is the default absent a strong Sanskrit signal.
pub fn rule_based(text: &str) -> ClassificationResult {
    let devanagari_count = text.chars().filter(|ch| is_devanagari(*ch)).count();
    let gujarati_count = text.chars().filter(|ch| is_gujarati(*ch)).count();
    let indic_count = devanagari_count + gujarati_count;

    let tokens: Vec<&str> = text
        .split_whitespace()
        .map(|token| token.trim_matches(|ch: char| "।॥,.!?;:\"'()".contains(ch)))
        .filter(|token| !token.is_empty())
        .collect();
    let token_count = tokens.len();

    let gujarati_char_ratio = if indic_count == 0 {
        0.0
    } else {
        gujarati_count as f32 / indic_count as f32
    };

    let marker_count: usize = SANSKRIT_MARKERS
        .iter()
        .map(|marker| text.matches(marker).count())
        .sum();
    let sanskrit_marker_ratio = if devanagari_count == 0 {
        0.0
    } else {
        marker_count as f32 / devanagari_count as f32
    };

    let sanskrit_word_hits = tokens
        .iter()
        .filter(|token| SANSKRIT_FUNCTION_WORDS.contains(token))
        .count();
    let word_ratio = if token_count == 0 {
        0.0
    } else {
        sanskrit_word_hits as f32 / token_count as f32
    };

    let details = MethodDetails::RuleSignals {
        gujarati_char_ratio,
        sanskrit_marker_ratio,
        sanskrit_word_hits,
        token_count,
    };

    // No Indic script at all: default to Hindi at maximal uncertainty.
    if indic_count == 0 {
        return result_with(text, Language::Hindi, 0.5, details);
    }

    if gujarati_char_ratio > 0.5 {
        let confidence = (0.5 + gujarati_char_ratio / 2.0).clamp(0.5, 1.0);
        return result_with(text, Language::Gujarati, confidence, details);
    }

    let signal = (sanskrit_marker_ratio * 4.0 + word_ratio * 2.0).min(1.0);

    if signal >= SANSKRIT_SIGNAL_FLOOR {
        let confidence = (0.5 + signal / 2.0).clamp(0.5, 1.0);
        result_with(text, Language::Sanskrit, confidence, details)
    } else {
        let confidence = (1.0 - signal).clamp(0.5, 1.0);
        result_with(text, Language::Hindi, confidence, details)
    }
}

fn result_with(
    text: &str,
    language: Language,
    confidence: f32,
    details: MethodDetails,
) -> ClassificationResult {
    ClassificationResult {
        text: text.to_string(),
        language,
        confidence,
        method: ClassifyMethod::RuleBased,
        details,
    }
}

#[derive(Debug, Deserialize)]
struct RemotePrediction {
    language: Language,
    probability: f32,
}

#[derive(Debug, Deserialize)]
struct RemotePredictResponse {
    probabilities: Vec<RemotePrediction>,
}

/// Model-serving sidecar client (fasttext or indicbert behind an HTTP
/// endpoint). Sends `{"text": ...}`, expects per-language softmax
/// probabilities back.
pub struct RemoteScriptModel {
    client: Client,
    endpoint: String,
    name: String,
}

impl RemoteScriptModel {
    pub fn new(
        endpoint: impl Into<String>,
        name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            name: name.into(),
        })
    }
}

#[async_trait]
impl ScriptModel for RemoteScriptModel {
    async fn predict(&self, text: &str) -> Result<Vec<(Language, f32)>, ModelError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|error| ModelError::Unavailable {
                model: self.name.clone(),
                details: error.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ModelError::Unavailable {
                model: self.name.clone(),
                details: response.status().to_string(),
            });
        }

        let payload: RemotePredictResponse = response.json().await?;
        Ok(payload
            .probabilities
            .into_iter()
            .map(|entry| (entry.language, entry.probability))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubModel {
        scores: Vec<(Language, f32)>,
    }

    #[async_trait]
    impl ScriptModel for StubModel {
        async fn predict(&self, _text: &str) -> Result<Vec<(Language, f32)>, ModelError> {
            Ok(self.scores.clone())
        }
    }

    struct BrokenModel;

    #[async_trait]
    impl ScriptModel for BrokenModel {
        async fn predict(&self, _text: &str) -> Result<Vec<(Language, f32)>, ModelError> {
            Err(ModelError::Unavailable {
                model: "broken".to_string(),
                details: "not loaded".to_string(),
            })
        }
    }

    #[test]
    fn rule_based_detects_sanskrit_verse() {
        let result = rule_based("धर्मक्षेत्रे कुरुक्षेत्रे समवेता युयुत्सवः। सञ्जय उवाच।");
        assert_eq!(result.language, Language::Sanskrit);
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn rule_based_defaults_to_hindi_for_plain_prose() {
        let result = rule_based("यह किताब बहुत अच्छी और सरल भाषा में लिखी गई");
        assert_eq!(result.language, Language::Hindi);
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn rule_based_detects_gujarati_script() {
        let result = rule_based("આ ગ્રંથ ખૂબ જૂનો અને મહત્વનો છે");
        assert_eq!(result.language, Language::Gujarati);
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn rule_based_latin_text_is_maximally_uncertain() {
        let result = rule_based("plain english line");
        assert_eq!(result.language, Language::Hindi);
        assert_eq!(result.confidence, 0.5);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let classifier = LanguageClassifier::rule_based_only();
        let error = classifier
            .classify("   ", ClassifyMethod::RuleBased)
            .await
            .expect_err("whitespace must be rejected");
        assert!(matches!(error, ClassifyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_model_fails_with_unavailable() {
        let classifier = LanguageClassifier::rule_based_only();
        let error = classifier
            .classify("कोई वाक्य", ClassifyMethod::Fasttext)
            .await
            .expect_err("no fasttext model is loaded");
        assert!(matches!(
            error,
            ClassifyError::Model(ModelError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn classification_is_idempotent() {
        let classifier = LanguageClassifier::rule_based_only();
        let first = classifier
            .classify("रामः वनं गच्छति स्म", ClassifyMethod::RuleBased)
            .await
            .expect("classify");
        let second = classifier
            .classify("रामः वनं गच्छति स्म", ClassifyMethod::RuleBased)
            .await
            .expect("classify");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn hybrid_short_circuits_on_confident_rule_result() {
        let classifier = LanguageClassifier::new(
            Some(Arc::new(StubModel {
                scores: vec![(Language::Sanskrit, 0.99), (Language::Hindi, 0.01)],
            })),
            None,
            ClassifierOptions::default(),
        );

        // Plain Hindi prose scores 1.0 on the rule path, above the 0.9
        // short-circuit threshold, so the stub never overrides it.
        let result = classifier
            .classify("यह किताब बहुत अच्छी और सरल भाषा में लिखी गई", ClassifyMethod::Hybrid)
            .await
            .expect("classify");
        assert_eq!(result.language, Language::Hindi);
        assert!(matches!(
            result.details,
            MethodDetails::HybridTrace {
                short_circuited: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn hybrid_confidence_is_at_least_min_of_consulted() {
        let classifier = LanguageClassifier::new(
            Some(Arc::new(StubModel {
                scores: vec![(Language::Sanskrit, 0.8), (Language::Hindi, 0.2)],
            })),
            Some(Arc::new(StubModel {
                scores: vec![(Language::Sanskrit, 0.7), (Language::Hindi, 0.3)],
            })),
            ClassifierOptions::default(),
        );

        let result = classifier
            .classify("plain english line", ClassifyMethod::Hybrid)
            .await
            .expect("classify");
        // Consulted confidences are 0.5 (rule), 0.8, 0.7.
        assert!(result.confidence >= 0.5);
        assert_eq!(result.language, Language::Sanskrit);
        assert_eq!(result.confidence, 0.8);
    }

    #[tokio::test]
    async fn hybrid_tie_break_prefers_rule_based_within_epsilon() {
        let classifier = LanguageClassifier::new(
            Some(Arc::new(StubModel {
                scores: vec![(Language::Sanskrit, 0.52), (Language::Hindi, 0.48)],
            })),
            None,
            ClassifierOptions::default(),
        );

        // Rule path yields Hindi at 0.5; the stub's 0.52 is within the
        // 0.05 epsilon, so the deterministic rule label wins.
        let result = classifier
            .classify("plain english line", ClassifyMethod::Hybrid)
            .await
            .expect("classify");
        assert_eq!(result.language, Language::Hindi);
    }

    #[tokio::test]
    async fn hybrid_survives_a_broken_model() {
        let classifier = LanguageClassifier::new(
            Some(Arc::new(BrokenModel)),
            None,
            ClassifierOptions::default(),
        );

        let result = classifier
            .classify("plain english line", ClassifyMethod::Hybrid)
            .await
            .expect("hybrid must degrade, not fail");
        assert_eq!(result.language, Language::Hindi);
    }

    #[tokio::test]
    async fn batch_isolates_per_item_failures() {
        let classifier = LanguageClassifier::rule_based_only();
        let lines = vec![
            "रामः वनं गच्छति स्म".to_string(),
            "   ".to_string(),
            "આ ગ્રંથ ખૂબ જૂનો છે".to_string(),
        ];

        let results = classifier
            .classify_batch(&lines, ClassifyMethod::RuleBased)
            .await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
