use crate::{
    asset::{AssetCatalog, AudioCategory},
    error::CallResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VoiceAction {
    Play { url: String },
    Say { text: String },
    Dial { number: String },
}

/// What the callee hears, in order. Built once per call and handed to the
/// provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallScript {
    actions: Vec<VoiceAction>,
}

impl CallScript {
    pub fn new(actions: Vec<VoiceAction>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[VoiceAction] {
        &self.actions
    }

    pub fn to_twiml(&self) -> String {
        let mut twiml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
        for action in &self.actions {
            match action {
                VoiceAction::Play { url } => {
                    twiml.push_str(&format!(r#"<Play loop="1">{}</Play>"#, xml_escape(url)))
                }
                VoiceAction::Say { text } => {
                    twiml.push_str(&format!("<Say>{}</Say>", xml_escape(text)))
                }
                VoiceAction::Dial { number } => {
                    twiml.push_str(&format!("<Dial>{}</Dial>", xml_escape(number)))
                }
            }
        }
        twiml.push_str("</Response>");
        twiml
    }
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub struct CallScriptBuilder {
    catalog: Arc<AssetCatalog>,
    waiting_notice: String,
}

impl CallScriptBuilder {
    pub fn new(catalog: Arc<AssetCatalog>, waiting_notice: impl Into<String>) -> Self {
        Self {
            catalog,
            waiting_notice: waiting_notice.into(),
        }
    }

    /// Play a clip from `category`, read the waiting notice, then bridge to
    /// `callback_number`. Without a callback number the dial step is left out.
    pub async fn build(
        &self,
        callee_number: &str,
        category: AudioCategory,
        callback_number: Option<&str>,
    ) -> CallResult<CallScript> {
        let url = self.catalog.resolve_by_category(category).await?;
        let mut actions = vec![
            VoiceAction::Play { url },
            VoiceAction::Say {
                text: self.waiting_notice.clone(),
            },
        ];
        match callback_number.map(str::trim).filter(|n| !n.is_empty()) {
            Some(number) => actions.push(VoiceAction::Dial {
                number: number.to_string(),
            }),
            None => warn!(
                callee = callee_number,
                %category,
                "no callback number, call script has no dial step"
            ),
        }
        debug!(callee = callee_number, %category, steps = actions.len(), "call script built");
        Ok(CallScript::new(actions))
    }
}
