/// Mail-merge templates and open/click tracking
///
/// Templates use `{{name}}` placeholders (inner whitespace allowed). Unknown
/// placeholders render as an empty string; an unterminated `{{` is copied
/// through unchanged.
///
/// Click links carry an HMAC-SHA256 signature over the log id and target,
/// so the redirect endpoint only follows links this system wrote.
///
/// # Example
///
/// ```
/// use ecclesia_shared::mail::template::render_template;
/// use std::collections::HashMap;
///
/// let mut vars = HashMap::new();
/// vars.insert("first_name".to_string(), "Ada".to_string());
///
/// let text = render_template("Dear {{ first_name }},{{missing}} welcome", &vars);
/// assert_eq!(text, "Dear Ada, welcome");
/// ```

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

fn render_with<F>(template: &str, vars: &HashMap<String, String>, escape: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = vars.get(key) {
                    out.push_str(&escape(value));
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Substitutes placeholders verbatim (subjects, plain text)
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    render_with(template, vars, str::to_string)
}

/// Substitutes placeholders with HTML-escaped values (HTML bodies)
pub fn render_html(template: &str, vars: &HashMap<String, String>) -> String {
    render_with(template, vars, escape_html)
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverses [`escape_html`] for attribute values copied out of markup
pub fn unescape_html(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Only absolute http(s) URLs are rewritten or redirected to
pub fn is_trackable_url(target: &str) -> bool {
    match reqwest::Url::parse(target) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Click-link key both binaries fall back to in development
pub const DEVELOPMENT_TRACKING_SECRET: &str = "ecclesia-development-tracking-secret";

/// Open and click tracking links under the public base URL
#[derive(Clone)]
pub struct LinkTracker {
    base_url: String,
    secret: Vec<u8>,
}

impl fmt::Debug for LinkTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkTracker")
            .field("base_url", &self.base_url)
            .field("secret", &"[redacted]")
            .finish()
    }
}

impl LinkTracker {
    pub fn new(base_url: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn mac(&self, log_id: Uuid, target: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(log_id.as_bytes());
        mac.update(target.as_bytes());
        Some(mac)
    }

    /// Hex signature binding `target` to `log_id`
    pub fn sign(&self, log_id: Uuid, target: &str) -> String {
        self.mac(log_id, target)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }

    /// Constant-time check of a click link's signature
    pub fn verify_click(&self, log_id: Uuid, target: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        self.mac(log_id, target)
            .map_or(false, |mac| mac.verify_slice(&expected).is_ok())
    }

    /// URL of the 1x1 pixel that marks a log row opened
    pub fn open_pixel_url(&self, log_id: Uuid) -> String {
        format!("{}/t/open/{}", self.base_url, log_id)
    }

    /// Signed URL that marks a log row clicked and redirects to `target`
    pub fn click_url(&self, log_id: Uuid, target: &str) -> String {
        let endpoint = format!("{}/t/click/{}", self.base_url, log_id);
        let signature = self.sign(log_id, target);
        match reqwest::Url::parse_with_params(&endpoint, &[("url", target), ("sig", &signature)]) {
            Ok(url) => url.to_string(),
            // Base URL unparsable; send the reader straight to the target
            Err(_) => target.to_string(),
        }
    }

    /// Rewrites `href="http..."` links through the click tracker and
    /// appends the open pixel
    pub fn add_tracking(&self, html: &str, log_id: Uuid) -> String {
        const HREF: &str = "href=\"";

        let mut out = String::with_capacity(html.len() + 256);
        let mut rest = html;

        while let Some(pos) = rest.find(HREF) {
            let value_start = pos + HREF.len();
            out.push_str(&rest[..value_start]);
            let after = &rest[value_start..];

            match after.find('"') {
                Some(end) => {
                    let raw = &after[..end];
                    let target = unescape_html(raw);
                    if is_trackable_url(&target) {
                        out.push_str(&escape_html(&self.click_url(log_id, &target)));
                    } else {
                        out.push_str(raw);
                    }
                    rest = &after[end..];
                }
                None => {
                    rest = after;
                    break;
                }
            }
        }
        out.push_str(rest);

        let pixel = format!(
            "<img src=\"{}\" width=\"1\" height=\"1\" alt=\"\" style=\"display:none\">",
            self.open_pixel_url(log_id)
        );
        match out.rfind("</body>") {
            Some(idx) => out.insert_str(idx, &pixel),
            None => out.push_str(&pixel),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("first_name".to_string(), "Ada".to_string()),
            ("event_title".to_string(), "Harvest <Thanksgiving>".to_string()),
        ])
    }

    #[test]
    fn test_render_template() {
        assert_eq!(render_template("Hi {{first_name}}!", &vars()), "Hi Ada!");
        assert_eq!(render_template("Hi {{  first_name  }}", &vars()), "Hi Ada");
        assert_eq!(render_template("{{unknown}}x", &vars()), "x");
        assert_eq!(render_template("no placeholders", &vars()), "no placeholders");
        assert_eq!(render_template("broken {{first_name", &vars()), "broken {{first_name");
    }

    #[test]
    fn test_render_html_escapes_values_only() {
        let html = render_html("<h1>{{event_title}}</h1>", &vars());
        assert_eq!(html, "<h1>Harvest &lt;Thanksgiving&gt;</h1>");
    }

    fn tracker() -> LinkTracker {
        LinkTracker::new("https://app.example.org/", "tracking-secret")
    }

    fn query_param(url: &str, name: &str) -> String {
        let url = reqwest::Url::parse(url).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn test_tracking_urls() {
        let id = Uuid::nil();
        assert_eq!(
            tracker().open_pixel_url(id),
            format!("https://app.example.org/t/open/{}", id)
        );

        let url = tracker().click_url(id, "https://example.org/a?b=c&d=e");
        assert!(url.starts_with(&format!("https://app.example.org/t/click/{}?url=", id)));
        assert!(url.contains("https%3A%2F%2Fexample.org%2Fa%3Fb%3Dc%26d%3De"));
        assert_eq!(query_param(&url, "url"), "https://example.org/a?b=c&d=e");
    }

    #[test]
    fn test_click_signature() {
        let tracker = tracker();
        let id = Uuid::new_v4();
        let url = tracker.click_url(id, "https://example.org/harvest");
        let sig = query_param(&url, "sig");

        assert!(tracker.verify_click(id, "https://example.org/harvest", &sig));
        assert!(!tracker.verify_click(id, "https://evil.example/harvest", &sig));
        assert!(!tracker.verify_click(Uuid::new_v4(), "https://example.org/harvest", &sig));
        assert!(!tracker.verify_click(id, "https://example.org/harvest", "zz-not-hex"));
        assert!(!tracker.verify_click(id, "https://example.org/harvest", ""));

        let other = LinkTracker::new("https://app.example.org", "another-secret");
        assert!(!other.verify_click(id, "https://example.org/harvest", &sig));
    }

    #[test]
    fn test_unescape_html() {
        assert_eq!(unescape_html("a?b=1&amp;c=2"), "a?b=1&c=2");
        assert_eq!(unescape_html("&quot;&#39;&lt;&gt;"), "\"'<>");
        assert_eq!(unescape_html("&amp;lt;"), "&lt;");
        assert_eq!(unescape_html(&escape_html("x=<'&\">")), "x=<'&\">");
    }

    #[test]
    fn test_is_trackable_url() {
        assert!(is_trackable_url("https://example.org/path"));
        assert!(is_trackable_url("http://example.org"));
        assert!(!is_trackable_url("mailto:office@example.org"));
        assert!(!is_trackable_url("javascript:alert(1)"));
        assert!(!is_trackable_url("/relative"));
    }

    #[test]
    fn test_add_tracking() {
        let id = Uuid::new_v4();
        let html = r#"<body><a href="https://example.org">Go</a> <a href="mailto:x@y.z">Mail</a></body>"#;
        let tracked = tracker().add_tracking(html, id);

        assert!(tracked.contains(&format!("https://app.example.org/t/click/{}?url=", id)));
        assert!(tracked.contains("&amp;sig="));
        assert!(tracked.contains(r#"href="mailto:x@y.z""#));
        assert!(tracked.contains(&format!("/t/open/{}", id)));
        assert!(tracked.ends_with("</body>"));
    }

    #[test]
    fn test_add_tracking_decodes_entities_in_links() {
        let tracker = tracker();
        let id = Uuid::new_v4();
        let html = r#"<a href="https://example.org/rsvp?event=7&amp;reply=yes">RSVP</a>"#;
        let tracked = tracker.add_tracking(html, id);

        let start = tracked.find("href=\"").unwrap() + 6;
        let end = start + tracked[start..].find('"').unwrap();
        let href = unescape_html(&tracked[start..end]);

        let target = query_param(&href, "url");
        assert_eq!(target, "https://example.org/rsvp?event=7&reply=yes");
        assert!(tracker.verify_click(id, &target, &query_param(&href, "sig")));
    }
}
