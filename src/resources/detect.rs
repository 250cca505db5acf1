//! Project-shape detection.
//!
//! Inspects the files at a project root and derives the build/run/test
//! command set. Precedence is fixed: package manifests first (with
//! dependency inspection for the Node ecosystem), then interpreter-specific
//! markers, then generic extension sniffing, then the static-asset fallback.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Detected project kind. Drives the command table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectKind {
    Nextjs,
    ViteReact,
    ViteVue,
    React,
    Vue,
    Express,
    Nodejs,
    Django,
    Flask,
    Python,
    Go,
    Maven,
    Gradle,
    Rust,
    Dotnet,
    Docker,
    Static,
    Unknown,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Nextjs => "nextjs",
            ProjectKind::ViteReact => "vite-react",
            ProjectKind::ViteVue => "vite-vue",
            ProjectKind::React => "react",
            ProjectKind::Vue => "vue",
            ProjectKind::Express => "express",
            ProjectKind::Nodejs => "nodejs",
            ProjectKind::Django => "django",
            ProjectKind::Flask => "flask",
            ProjectKind::Python => "python",
            ProjectKind::Go => "go",
            ProjectKind::Maven => "maven",
            ProjectKind::Gradle => "gradle",
            ProjectKind::Rust => "rust",
            ProjectKind::Dotnet => "dotnet",
            ProjectKind::Docker => "docker",
            ProjectKind::Static => "static",
            ProjectKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command set for one project kind. `run` templates may contain `{port}`,
/// substituted at service start; the `PORT` environment variable is set
/// either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub kind: ProjectKind,
    pub install: Option<String>,
    pub build: Option<String>,
    pub run: Option<String>,
    pub test: Option<String>,
    /// Ports the service is expected to listen on, preferred first.
    pub expected_ports: Vec<u16>,
}

impl BuildConfig {
    fn new(kind: ProjectKind) -> Self {
        Self {
            kind,
            install: None,
            build: None,
            run: None,
            test: None,
            expected_ports: Vec::new(),
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        self.expected_ports.first().copied()
    }
}

/// Detect the project kind from the files directly under `root`.
pub fn detect_project_kind(root: &Path) -> ProjectKind {
    let files: HashSet<String> = match std::fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect(),
        Err(_) => return ProjectKind::Unknown,
    };

    let kind = if files.contains("package.json") {
        detect_node_kind(root)
    } else if files.contains("pom.xml") {
        ProjectKind::Maven
    } else if files.contains("build.gradle") {
        ProjectKind::Gradle
    } else if files.contains("requirements.txt") || files.contains("pyproject.toml") {
        if files.contains("manage.py") {
            ProjectKind::Django
        } else if files.contains("app.py")
            || files.iter().any(|f| f.starts_with("main") && f.ends_with(".py"))
        {
            ProjectKind::Flask
        } else {
            ProjectKind::Python
        }
    } else if files.contains("go.mod") {
        ProjectKind::Go
    } else if files.contains("Cargo.toml") {
        ProjectKind::Rust
    } else if files.iter().any(|f| f.ends_with(".csproj") || f.ends_with(".sln")) {
        ProjectKind::Dotnet
    } else if files.contains("Dockerfile") {
        ProjectKind::Docker
    } else if files.iter().any(|f| f.ends_with(".html")) {
        ProjectKind::Static
    } else {
        ProjectKind::Unknown
    };
    debug!(root = %root.display(), kind = %kind, "detected project kind");
    kind
}

/// Distinguish Node frameworks by declared dependencies. An unreadable or
/// malformed package.json degrades to plain `nodejs`.
fn detect_node_kind(root: &Path) -> ProjectKind {
    let manifest: Value = match std::fs::read_to_string(root.join("package.json"))
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
    {
        Some(v) => v,
        None => return ProjectKind::Nodejs,
    };
    let has = |section: &str, name: &str| {
        manifest
            .get(section)
            .and_then(|d| d.get(name))
            .is_some()
    };

    if has("dependencies", "next") {
        ProjectKind::Nextjs
    } else if has("dependencies", "react") && has("devDependencies", "vite") {
        ProjectKind::ViteReact
    } else if has("dependencies", "vue") && has("devDependencies", "vite") {
        ProjectKind::ViteVue
    } else if has("dependencies", "react") {
        ProjectKind::React
    } else if has("dependencies", "vue") {
        ProjectKind::Vue
    } else if has("dependencies", "express") {
        ProjectKind::Express
    } else {
        ProjectKind::Nodejs
    }
}

/// The command table for each kind.
pub fn build_config_for(kind: ProjectKind) -> BuildConfig {
    let mut config = BuildConfig::new(kind);
    match kind {
        ProjectKind::Nextjs => {
            config.install = Some("npm install".into());
            config.build = Some("npm run build".into());
            config.run = Some("npm run start -- -p {port}".into());
            config.test = Some("npm test -- --watchAll=false".into());
            config.expected_ports = vec![3000];
        }
        ProjectKind::ViteReact | ProjectKind::ViteVue => {
            config.install = Some("npm install".into());
            config.build = Some("npm run build".into());
            config.run = Some("npm run preview -- --port {port}".into());
            config.test = Some("npm test -- --watchAll=false".into());
            config.expected_ports = vec![4173, 5173];
        }
        ProjectKind::React => {
            config.install = Some("npm install".into());
            config.build = Some("npm run build".into());
            config.run = Some("npm start".into());
            config.test = Some("npm test -- --watchAll=false".into());
            config.expected_ports = vec![3000];
        }
        ProjectKind::Vue => {
            config.install = Some("npm install".into());
            config.run = Some("npm run serve -- --port {port}".into());
            config.test = Some("npm test -- --watchAll=false".into());
            config.expected_ports = vec![8080, 3000];
        }
        ProjectKind::Express | ProjectKind::Nodejs => {
            config.install = Some("npm install".into());
            config.run = Some("npm start".into());
            config.test = Some("npm test -- --watchAll=false".into());
            config.expected_ports = vec![3000, 8000];
        }
        ProjectKind::Django => {
            config.install = Some("pip install -r requirements.txt".into());
            config.run = Some("python manage.py runserver 0.0.0.0:{port}".into());
            config.test = Some("python manage.py test".into());
            config.expected_ports = vec![8000];
        }
        ProjectKind::Flask => {
            config.install = Some("pip install -r requirements.txt".into());
            config.run = Some("python app.py".into());
            config.test = Some("python -m pytest".into());
            config.expected_ports = vec![5000, 8000];
        }
        ProjectKind::Python => {
            config.install = Some("pip install -r requirements.txt".into());
            config.run = Some("python main.py".into());
            config.test = Some("python -m pytest".into());
            config.expected_ports = vec![8000, 5000];
        }
        ProjectKind::Go => {
            config.build = Some("go build -o app .".into());
            config.run = Some("./app".into());
            config.test = Some("go test ./...".into());
            config.expected_ports = vec![8080, 3000];
        }
        ProjectKind::Maven => {
            config.install = Some("mvn clean install".into());
            config.build = Some("mvn package".into());
            config.run = Some("java -jar target/*.jar".into());
            config.test = Some("mvn test".into());
            config.expected_ports = vec![8080];
        }
        ProjectKind::Gradle => {
            config.install = Some("./gradlew build".into());
            config.run = Some("./gradlew bootRun".into());
            config.test = Some("./gradlew test".into());
            config.expected_ports = vec![8080];
        }
        ProjectKind::Rust => {
            config.build = Some("cargo build --release".into());
            config.run = Some("cargo run".into());
            config.test = Some("cargo test".into());
            config.expected_ports = vec![8080, 3000];
        }
        ProjectKind::Dotnet => {
            config.install = Some("dotnet restore".into());
            config.build = Some("dotnet build".into());
            config.run = Some("dotnet run".into());
            config.test = Some("dotnet test".into());
            config.expected_ports = vec![5000, 5001];
        }
        ProjectKind::Docker => {
            config.build = Some("docker build -t app .".into());
            config.run = Some("docker run -p {port}:3000 app".into());
            config.expected_ports = vec![3000];
        }
        ProjectKind::Static => {
            config.run = Some("python3 -m http.server {port}".into());
            config.expected_ports = vec![8000];
        }
        ProjectKind::Unknown => {}
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, name: &str, content: &str) {
        fs::write(root.join(name), content).unwrap();
    }

    #[test]
    fn detects_nextjs_from_package_json_dependencies() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "package.json",
            r#"{"dependencies": {"next": "14.0.0", "react": "18.0.0"}}"#,
        );
        assert_eq!(detect_project_kind(tmp.path()), ProjectKind::Nextjs);
    }

    #[test]
    fn detects_vite_react_over_plain_react() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "package.json",
            r#"{"dependencies": {"react": "18"}, "devDependencies": {"vite": "5"}}"#,
        );
        assert_eq!(detect_project_kind(tmp.path()), ProjectKind::ViteReact);
    }

    #[test]
    fn malformed_package_json_degrades_to_nodejs() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "package.json", "not json at all");
        assert_eq!(detect_project_kind(tmp.path()), ProjectKind::Nodejs);
    }

    #[test]
    fn package_json_outranks_other_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "package.json", r#"{"dependencies": {"express": "4"}}"#);
        write(tmp.path(), "requirements.txt", "flask");
        write(tmp.path(), "Cargo.toml", "[package]");
        assert_eq!(detect_project_kind(tmp.path()), ProjectKind::Express);
    }

    #[test]
    fn python_markers_split_django_flask_plain() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "requirements.txt", "django");
        write(tmp.path(), "manage.py", "");
        assert_eq!(detect_project_kind(tmp.path()), ProjectKind::Django);

        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "requirements.txt", "flask");
        write(tmp.path(), "app.py", "");
        assert_eq!(detect_project_kind(tmp.path()), ProjectKind::Flask);

        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "requirements.txt", "requests");
        assert_eq!(detect_project_kind(tmp.path()), ProjectKind::Python);
    }

    #[test]
    fn html_fallback_and_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "index.html", "<html></html>");
        assert_eq!(detect_project_kind(tmp.path()), ProjectKind::Static);

        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "notes.txt", "nothing to see");
        assert_eq!(detect_project_kind(tmp.path()), ProjectKind::Unknown);
    }

    #[test]
    fn every_known_kind_has_a_usable_config() {
        for kind in [
            ProjectKind::Nextjs,
            ProjectKind::Express,
            ProjectKind::Django,
            ProjectKind::Go,
            ProjectKind::Rust,
            ProjectKind::Static,
        ] {
            let config = build_config_for(kind);
            assert!(config.run.is_some(), "{} has no run command", kind);
            assert!(config.default_port().is_some(), "{} has no port hint", kind);
        }
        assert!(build_config_for(ProjectKind::Unknown).run.is_none());
    }
}
