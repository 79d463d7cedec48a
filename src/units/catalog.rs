//! Built-in unit catalog
//!
//! Every gatherer and audit the built-in presets name, addressed by the same
//! identifiers the presets use.

use std::sync::Arc;

use super::{Audit, AuditMeta, DeclaredAudit, DeclaredGatherer, GathererFactory};

const TRACES: &str = "traces";
const DEVTOOLS_LOGS: &str = "devtoolsLogs";

/// (identifier, artifact name)
const GATHERERS: &[(&str, &str)] = &[
    ("scripts", "Scripts"),
    ("css-usage", "CSSUsage"),
    ("viewport", "Viewport"),
    ("viewport-dimensions", "ViewportDimensions"),
    ("theme-color", "ThemeColor"),
    ("manifest", "Manifest"),
    ("runtime-exceptions", "RuntimeExceptions"),
    ("chrome-console-messages", "ChromeConsoleMessages"),
    ("image-usage", "ImageUsage"),
    ("accessibility", "Accessibility"),
    ("dobetterweb/doctype", "Doctype"),
    ("seo/meta-description", "MetaDescription"),
    ("seo/font-size", "FontSize"),
    ("seo/robots-txt", "RobotsTxt"),
    ("service-worker", "ServiceWorker"),
    ("offline", "Offline"),
    ("start-url", "StartUrl"),
    ("http-redirect", "HTTPRedirect"),
    ("html-without-javascript", "HTMLWithoutJavaScript"),
    ("js-usage", "JsUsage"),
];

/// (identifier, title, required artifacts); the audit id is the last
/// identifier segment
const AUDITS: &[(&str, &str, &[&str])] = &[
    ("first-contentful-paint", "First Contentful Paint", &[TRACES, DEVTOOLS_LOGS]),
    ("first-meaningful-paint", "First Meaningful Paint", &[TRACES, DEVTOOLS_LOGS]),
    ("speed-index", "Speed Index", &[TRACES, DEVTOOLS_LOGS]),
    ("interactive", "Time to Interactive", &[TRACES, DEVTOOLS_LOGS]),
    ("first-cpu-idle", "First CPU Idle", &[TRACES, DEVTOOLS_LOGS]),
    ("estimated-input-latency", "Estimated Input Latency", &[TRACES]),
    ("bootup-time", "JavaScript execution time", &[TRACES]),
    ("network-requests", "Network Requests", &[DEVTOOLS_LOGS]),
    ("metrics", "Metrics", &[TRACES, DEVTOOLS_LOGS]),
    (
        "byte-efficiency/render-blocking-resources",
        "Eliminate render-blocking resources",
        &["CSSUsage", TRACES, DEVTOOLS_LOGS],
    ),
    (
        "byte-efficiency/uses-optimized-images",
        "Efficiently encode images",
        &["ImageUsage", DEVTOOLS_LOGS],
    ),
    (
        "byte-efficiency/unused-css-rules",
        "Defer unused CSS",
        &["CSSUsage", DEVTOOLS_LOGS],
    ),
    (
        "byte-efficiency/unused-javascript",
        "Remove unused JavaScript",
        &["JsUsage", DEVTOOLS_LOGS],
    ),
    ("service-worker", "Registers a service worker", &["ServiceWorker"]),
    ("works-offline", "Responds with a 200 when offline", &["Offline"]),
    ("viewport", "Has a viewport meta tag", &["Viewport"]),
    ("without-javascript", "Contains some content when JavaScript is not available", &["HTMLWithoutJavaScript"]),
    ("redirects-http", "Redirects HTTP traffic to HTTPS", &["HTTPRedirect"]),
    (
        "webapp-install-banner",
        "User can be prompted to install the web app",
        &["Manifest", "ServiceWorker", "StartUrl"],
    ),
    ("themed-omnibox", "Address bar matches brand colors", &["Manifest", "ThemeColor"]),
    ("content-width", "Content is sized correctly for the viewport", &["ViewportDimensions"]),
    ("accessibility/color-contrast", "Background and foreground colors have a sufficient contrast ratio", &["Accessibility"]),
    ("accessibility/image-alt", "Image elements have `[alt]` attributes", &["Accessibility"]),
    ("accessibility/document-title", "Document has a `<title>` element", &["Accessibility"]),
    ("dobetterweb/doctype", "Page has the HTML doctype", &["Doctype"]),
    ("errors-in-console", "No browser errors logged to the console", &["ChromeConsoleMessages", "RuntimeExceptions"]),
    ("deprecations", "Avoids deprecated APIs", &["ChromeConsoleMessages"]),
    ("seo/meta-description", "Document has a meta description", &["MetaDescription"]),
    ("seo/font-size", "Document uses legible font sizes", &["FontSize", "Viewport"]),
    ("seo/robots-txt", "robots.txt is valid", &["RobotsTxt"]),
];

/// Built-in gatherers keyed by identifier
pub fn builtin_gatherers() -> Vec<(String, Arc<dyn GathererFactory>)> {
    GATHERERS
        .iter()
        .map(|(identifier, name)| {
            let factory: Arc<dyn GathererFactory> = Arc::new(DeclaredGatherer::new(*name));
            (identifier.to_string(), factory)
        })
        .collect()
}

/// Built-in audits keyed by identifier
pub fn builtin_audits() -> Vec<(String, Arc<dyn Audit>)> {
    AUDITS
        .iter()
        .map(|(identifier, title, required)| {
            let id = identifier.rsplit('/').next().unwrap_or(identifier);
            let audit: Arc<dyn Audit> = Arc::new(DeclaredAudit::new(AuditMeta {
                id: id.to_string(),
                title: title.to_string(),
                description: String::new(),
                required_artifacts: required.iter().map(|a| a.to_string()).collect(),
            }));
            (identifier.to_string(), audit)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_audit_ids_are_last_segment() {
        let audits = builtin_audits();
        let (_, audit) = audits
            .iter()
            .find(|(identifier, _)| identifier == "byte-efficiency/unused-css-rules")
            .unwrap();
        assert_eq!(audit.meta().id, "unused-css-rules");
    }

    #[test]
    fn test_audit_ids_unique() {
        let audits = builtin_audits();
        let ids: BTreeSet<_> = audits.iter().map(|(_, a)| a.meta().id.clone()).collect();
        assert_eq!(ids.len(), audits.len());
    }

    #[test]
    fn test_required_artifacts_are_gathered() {
        let names: BTreeSet<_> = GATHERERS.iter().map(|(_, name)| *name).collect();
        for (identifier, _, required) in AUDITS {
            for artifact in *required {
                assert!(
                    *artifact == TRACES || *artifact == DEVTOOLS_LOGS || names.contains(artifact),
                    "{} requires unknown artifact {}",
                    identifier,
                    artifact
                );
            }
        }
    }
}
