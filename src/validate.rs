use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ApiError;
use crate::models::Id;
use crate::params::{Location, Params};

pub const MAX_TEXT_CHARS: usize = 10_000;

/// Field name -> first failure recorded for it.
pub type FieldErrors = BTreeMap<String, FieldError>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub msg: String,
    pub param: String,
    pub location: Location,
}

/// Collects field failures for one request. Accessors always hand back a
/// value (empty or zero when the field failed) so the handler can keep
/// reading fields; [`Validator::finish`] decides whether to continue.
pub struct Validator<'a> {
    params: &'a Params,
    errors: FieldErrors,
}

impl<'a> Validator<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self { params, errors: FieldErrors::new() }
    }

    /// Board name taken from the route path.
    pub fn board(&mut self, board: &str) -> String {
        if board.is_empty() {
            self.reject("board", "Board name is required", Location::Params);
        }
        board.to_owned()
    }

    pub fn required(&mut self, field: &str, msg: &str) -> String {
        match self.params.get(field) {
            Some(v) if !v.is_empty() => v.to_owned(),
            _ => {
                self.reject(field, msg, self.params.location(field));
                String::new()
            }
        }
    }

    /// Required post body, bounded by [`MAX_TEXT_CHARS`].
    pub fn text(&mut self, field: &str, msg: &str) -> String {
        let text = self.required(field, msg);
        if text.chars().count() > MAX_TEXT_CHARS {
            let msg = format!("Text message must be at most {MAX_TEXT_CHARS} characters");
            self.reject(field, &msg, self.params.location(field));
        }
        text
    }

    /// Required positive integer id.
    pub fn id(&mut self, field: &str, msg: &str) -> Id {
        let raw = self.required(field, msg);
        if raw.is_empty() {
            return 0;
        }
        match raw.trim().parse::<Id>() {
            Ok(id) if id > 0 => id,
            _ => {
                let msg = format!("{} must be a positive integer", field_label(field));
                self.reject(field, &msg, self.params.location(field));
                0
            }
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }

    fn reject(&mut self, field: &str, msg: &str, location: Location) {
        self.errors.entry(field.to_owned()).or_insert_with(|| FieldError {
            msg: msg.to_owned(),
            param: field.to_owned(),
            location,
        });
    }
}

fn field_label(field: &str) -> &str {
    match field {
        "thread_id" => "Thread id",
        "reply_id" => "Reply id",
        other => other,
    }
}
