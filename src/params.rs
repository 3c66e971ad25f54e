//! Request field extraction.
//!
//! Clients send fields as a JSON object, as an urlencoded form, or in the
//! query string; handlers see one flat string map. A query-string value
//! overrides a body value with the same name.

use std::collections::HashMap;

use actix_web::{dev::Payload, http::header, web, Error, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Body,
    Query,
    Params,
}

#[derive(Debug, Default, Clone)]
pub struct Params {
    values: HashMap<String, (String, Location)>,
}

impl Params {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(|(v, _)| v.as_str())
    }

    /// Where `field` came from; absent fields are reported against the body.
    pub fn location(&self, field: &str) -> Location {
        self.values.get(field).map(|(_, l)| *l).unwrap_or(Location::Body)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>, location: Location) {
        self.values.insert(field.into(), (value.into(), location));
    }

    fn extend_json(&mut self, body: &[u8]) {
        let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
            tracing::debug!("request body is not a JSON object; ignoring");
            return;
        };
        for (k, v) in map {
            let s = match v {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            self.insert(k, s, Location::Body);
        }
    }

    fn extend_urlencoded(&mut self, raw: &str, location: Location) {
        match web::Query::<HashMap<String, String>>::from_query(raw) {
            Ok(q) => {
                for (k, v) in q.into_inner() {
                    self.insert(k, v, location);
                }
            }
            Err(e) => tracing::debug!(error = %e, "undecodable urlencoded fields; ignoring"),
        }
    }
}

impl FromRequest for Params {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let query = req.query_string().to_owned();
        let body = web::Bytes::from_request(req, payload);

        Box::pin(async move {
            let bytes = body.await?;
            let mut params = Params::default();
            if !bytes.is_empty() {
                if content_type.starts_with("application/json") {
                    params.extend_json(&bytes);
                } else if content_type.starts_with("application/x-www-form-urlencoded") {
                    match std::str::from_utf8(&bytes) {
                        Ok(raw) => params.extend_urlencoded(raw, Location::Body),
                        Err(_) => tracing::debug!("form body is not UTF-8; ignoring"),
                    }
                }
            }
            if !query.is_empty() {
                params.extend_urlencoded(&query, Location::Query);
            }
            Ok(params)
        })
    }
}
