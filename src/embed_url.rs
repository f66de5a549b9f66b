//! Embed URL normalization
//!
//! Turns an operator-supplied viewer link into the address loaded by the
//! overlay frame. Defaults are only added when the operator left a key out,
//! and the existing query text is kept byte-for-byte.

use crate::config::{EmbedConfig, EmbedParam};
use crate::types::ParticipantId;
use url::{form_urlencoded, Url};

#[derive(Debug, Clone)]
pub struct EmbedUrlBuilder {
    params: Vec<EmbedParam>,
    viewer_param: String,
}

impl EmbedUrlBuilder {
    pub fn new(config: &EmbedConfig) -> Self {
        Self {
            params: config.params.clone(),
            viewer_param: config.viewer_param.clone(),
        }
    }

    /// Fully-qualified embed address for `raw_url`.
    ///
    /// Unparseable input comes back unchanged.
    pub fn build(&self, raw_url: &str, participant: &ParticipantId) -> String {
        let mut url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Using stream URL for {} as-is ({}): {}", participant, e, raw_url);
                return raw_url.to_string();
            }
        };

        let present: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        let mut appended = form_urlencoded::Serializer::new(String::new());
        let mut missing = 0usize;

        let defaults = self
            .params
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .chain(std::iter::once((self.viewer_param.as_str(), participant.as_str())));

        for (name, value) in defaults {
            if present.iter().any(|k| k == name) {
                continue;
            }
            appended.append_pair(name, value);
            missing += 1;
        }

        if missing > 0 {
            let appended = appended.finish();
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, appended),
                _ => appended,
            };
            url.set_query(Some(&query));
        }

        url.to_string()
    }
}
