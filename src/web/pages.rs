// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTML pages for the scanner and the buyer dashboard

use axum::{extract::State, response::Html};
use minijinja::{context, Environment};
use std::sync::{Arc, OnceLock};

use super::AppState;
use crate::Result;

const BASE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ title }} - E-Waste Scanner</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               background: #10231a; color: #e8e8e8; margin: 0; line-height: 1.6; }
        nav { background: #163a2a; padding: 15px 20px; display: flex; gap: 30px; }
        nav a { color: #a0d8b3; text-decoration: none; }
        main { max-width: 1100px; margin: 0 auto; padding: 20px; }
        .card { background: #1d4d37; border-radius: 12px; padding: 20px; margin-bottom: 20px; }
        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 10px; text-align: left; border-bottom: 1px solid #2a6b4d; }
        .toxicity-high { color: #ff6b6b; } .toxicity-medium { color: #ffd166; } .toxicity-low { color: #00d9a5; }
    </style>
</head>
<body>
    <nav>
        <a href="/"><strong>E-Waste Scanner</strong></a>
        <a href="/scanner">Scan</a>
        <a href="/buyer-dashboard">Listings</a>
        <a href="/logout">Logout</a>
    </nav>
    <main>{% block content %}{% endblock %}</main>
</body>
</html>"#;

const INDEX: &str = r#"{% extends "base.html" %}
{% block content %}
<h1>Recycle electronics responsibly</h1>
<div class="card">
    <p>Photograph or upload an old device to identify its components, toxicity and recyclability.</p>
    <p>{{ item_count }} item{{ "" if item_count == 1 else "s" }} currently listed.</p>
</div>
{% endblock %}"#;

const SCANNER: &str = r#"{% extends "base.html" %}
{% block content %}
<h1>Scanner</h1>
<div class="card">
    <img src="/video_feed" alt="Live camera" width="{{ width }}" height="{{ height }}">
    <form method="post" action="/capture"><button type="submit">Capture</button></form>
</div>
<div class="card">
    <form method="post" action="/upload" enctype="multipart/form-data">
        <input type="file" name="file" accept="{{ accept }}">
        <button type="submit">Upload</button>
    </form>
</div>
{% endblock %}"#;

const BUYER_DASHBOARD: &str = r#"{% extends "base.html" %}
{% block content %}
<h1>Listed items</h1>
<div class="card">
{% if items %}
    <table>
        <tr><th>Product</th><th>Toxicity</th><th>Recyclable</th><th>Harmful substances</th><th>Listed</th></tr>
        {% for item in items %}
        <tr>
            <td>{{ item.product_name }}</td>
            <td{% if item.toxicity_level is string %} class="toxicity-{{ item.toxicity_level | lower }}"{% endif %}>{{ item.toxicity_level or "" }}</td>
            <td>{{ "Yes" if item.recyclable else "No" }}</td>
            {#- listed items keep whatever shape the client sent -#}
            <td>{% if item.harmful_substances is sequence %}{{ item.harmful_substances | join(", ") }}{% else %}{{ item.harmful_substances or "" }}{% endif %}</td>
            <td>{{ item.listed_at }}</td>
        </tr>
        {% endfor %}
    </table>
{% else %}
    <p>No items available yet. Check back later!</p>
{% endif %}
</div>
{% endblock %}"#;

fn environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        for (name, source) in [
            ("base.html", BASE),
            ("index.html", INDEX),
            ("scanner.html", SCANNER),
            ("buyer_dashboard.html", BUYER_DASHBOARD),
        ] {
            if let Err(e) = env.add_template(name, source) {
                tracing::error!("Invalid page template {}: {}", name, e);
            }
        }
        env
    })
}

fn render(name: &str, ctx: minijinja::Value) -> Result<Html<String>> {
    let html = environment().get_template(name)?.render(ctx)?;
    Ok(Html(html))
}

pub async fn index_page(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    render(
        "index.html",
        context! { title => "Home", item_count => state.store.count() },
    )
}

pub async fn scanner_page(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    let accept = state
        .config
        .storage
        .allowed_extensions
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",");

    render(
        "scanner.html",
        context! {
            title => "Scanner",
            width => state.config.camera.width,
            height => state.config.camera.height,
            accept => accept,
        },
    )
}

pub async fn buyer_dashboard_page(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    render(
        "buyer_dashboard.html",
        context! { title => "Listings", items => state.store.load_all() },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_templates_compile() {
        for name in ["base.html", "index.html", "scanner.html", "buyer_dashboard.html"] {
            assert!(environment().get_template(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_dashboard_lists_items() {
        let items = vec![json!({
            "product_name": "CRT <Monitor>",
            "toxicity_level": "High",
            "recyclable": true,
            "harmful_substances": ["lead", "mercury"],
            "listed_at": "2025-01-02 03:04:05",
        })];
        let Html(html) = render(
            "buyer_dashboard.html",
            context! { title => "Listings", items => items },
        )
        .unwrap();

        assert!(html.contains("CRT &lt;Monitor&gt;"));
        assert!(html.contains("toxicity-high"));
        assert!(html.contains("lead, mercury"));
    }

    #[test]
    fn test_dashboard_renders_unlisted_shapes() {
        let items = vec![
            json!({"product_name": "Kettle", "toxicity_level": 3, "recyclable": false, "harmful_substances": 7}),
            json!({"product_name": "Radio", "toxicity_level": "Low", "recyclable": true, "harmful_substances": "lead"}),
            json!({"product_name": "Lamp", "recyclable": true, "harmful_substances": null}),
        ];
        let Html(html) = render(
            "buyer_dashboard.html",
            context! { title => "Listings", items => items },
        )
        .unwrap();

        assert!(html.contains("<td>7</td>"));
        assert!(html.contains("<td>lead</td>"));
        assert!(!html.contains("l, e, a, d"));
        assert!(html.contains("toxicity-low"));
        assert!(!html.contains("toxicity-3"));
        assert!(html.contains("Lamp"));
    }

    #[test]
    fn test_dashboard_empty() {
        let Html(html) = render(
            "buyer_dashboard.html",
            context! { title => "Listings", items => Vec::<serde_json::Value>::new() },
        )
        .unwrap();
        assert!(html.contains("No items available yet"));
    }
}
