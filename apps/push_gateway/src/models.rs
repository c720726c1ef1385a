use serde_json::Value;

/// Parameters accepted on the inbound push endpoint.
#[derive(Debug, Clone, Default)]
pub struct SendParams {
    pub msg: String,
    pub title: String,
}

impl SendParams {
    pub fn new(msg: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            title: title.into(),
        }
    }

    /// Takes the first `msg` and `title` among decoded form fields. Repeated
    /// keys keep their first value and other keys are ignored.
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut msg = None;
        let mut title = None;
        for (key, value) in fields {
            match key {
                "msg" if msg.is_none() => msg = Some(value),
                "title" if title.is_none() => title = Some(value),
                _ => {}
            }
        }
        Self::new(msg.unwrap_or_default(), title.unwrap_or_default())
    }

    /// ` msg=<msg> title=<title>`, omitting empty values. Each part carries
    /// its own leading space.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if !self.msg.is_empty() {
            out.push_str(&format!(" msg={}", self.msg));
        }
        if !self.title.is_empty() {
            out.push_str(&format!(" title={}", self.title));
        }
        out
    }
}

/// A fully built outbound call: target URL plus JSON body.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub url: String,
    pub body: Value,
}
