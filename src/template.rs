//! `${VAR}` substitution for the proxy configuration template

use crate::error::OpsError;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Substitute every `${KEY}` occurrence from `vars`.
/// An unresolved placeholder is an error naming the variable; a literal `$`
/// not followed by `{` passes through untouched.
pub fn render(template: &str, vars: &HashMap<String, String>) -> Result<String, OpsError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated placeholder, keep the remainder verbatim
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => return Err(OpsError::UnresolvedPlaceholder(name.to_string())),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Render `template_path` into `output_path` via a temporary file and rename,
/// so a failed render never leaves a half-written config behind.
pub fn render_file(
    template_path: &Path,
    output_path: &Path,
    vars: &HashMap<String, String>,
) -> anyhow::Result<()> {
    let template = std::fs::read_to_string(template_path).map_err(|e| {
        anyhow::anyhow!("failed to read template {}: {}", template_path.display(), e)
    })?;

    let rendered = render(&template, vars)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = output_path.with_extension("tmp");
    std::fs::write(&tmp_path, &rendered)?;
    std::fs::rename(&tmp_path, output_path)?;

    info!(
        template = %template_path.display(),
        output = %output_path.display(),
        "Rendered configuration"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let vars = vars(&[
            ("PRIMARY_DOMAIN", "example.com"),
            ("SECONDARY_DOMAIN", "www.example.com"),
        ]);
        let out = render(
            "server_name ${PRIMARY_DOMAIN} ${SECONDARY_DOMAIN};",
            &vars,
        )
        .unwrap();
        assert_eq!(out, "server_name example.com www.example.com;");
    }

    #[test]
    fn test_render_repeated_placeholder() {
        let vars = vars(&[("PRIMARY_DOMAIN", "example.com")]);
        let out = render(
            "ssl_certificate /etc/letsencrypt/live/${PRIMARY_DOMAIN}/fullchain.pem;\n\
             ssl_certificate_key /etc/letsencrypt/live/${PRIMARY_DOMAIN}/privkey.pem;",
            &vars,
        )
        .unwrap();
        assert!(out.contains("live/example.com/fullchain.pem"));
        assert!(out.contains("live/example.com/privkey.pem"));
    }

    #[test]
    fn test_render_unknown_placeholder_fails() {
        let err = render("listen ${MISSING};", &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("${MISSING}"));
    }

    #[test]
    fn test_render_leaves_plain_dollar_alone() {
        let vars = vars(&[("HOST", "example.com")]);
        // nginx variables like $host must survive rendering
        let out = render("proxy_set_header Host $host; # ${HOST}", &vars).unwrap();
        assert_eq!(out, "proxy_set_header Host $host; # example.com");
    }

    #[test]
    fn test_render_unterminated_placeholder_passes_through() {
        let out = render("broken ${UNCLOSED", &HashMap::new()).unwrap();
        assert_eq!(out, "broken ${UNCLOSED");
    }

    #[test]
    fn test_render_file_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("nginx.conf.template");
        let output_path = dir.path().join("conf/nginx.conf");
        std::fs::write(&template_path, "server_name ${PRIMARY_DOMAIN};").unwrap();

        let vars = vars(&[("PRIMARY_DOMAIN", "example.com")]);
        render_file(&template_path, &output_path, &vars).unwrap();

        let rendered = std::fs::read_to_string(&output_path).unwrap();
        assert_eq!(rendered, "server_name example.com;");
        assert!(!output_path.with_extension("tmp").exists());
    }
}
