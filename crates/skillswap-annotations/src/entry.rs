use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teach_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learn_text: Option<String>,
}

impl AnnotationEntry {
    #[must_use]
    pub fn new(teach_text: Option<&str>, learn_text: Option<&str>) -> Self {
        Self {
            teach_text: teach_text.map(str::to_owned),
            learn_text: learn_text.map(str::to_owned),
        }
        .normalized()
    }

    #[must_use]
    pub fn teach(text: &str) -> Self {
        Self::new(Some(text), None)
    }

    #[must_use]
    pub fn learn(text: &str) -> Self {
        Self::new(None, Some(text))
    }

    /// Trim both fields; blank text counts as absent.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
        }
        Self {
            teach_text: clean(self.teach_text),
            learn_text: clean(self.learn_text),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.teach_text.is_none() && self.learn_text.is_none()
    }

    /// Field-wise merge: fields present in `partial` replace ours, absent ones
    /// leave ours untouched.
    pub fn merge(&mut self, partial: &Self) {
        if let Some(ref t) = partial.teach_text {
            self.teach_text = Some(t.clone());
        }
        if let Some(ref l) = partial.learn_text {
            self.learn_text = Some(l.clone());
        }
    }
}
