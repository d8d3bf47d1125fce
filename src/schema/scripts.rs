//! Versioned schema scripts
//!
//! Scripts are grouped by [`Task`] and ordered by the version number leading
//! their file name (`0002_measurements.sql` is version 2). A script is plain
//! SQL; statements end with `;` at the end of a line, `--` lines are
//! comments, and `%name%` placeholders are filled from [`ScriptProperties`].

use crate::schema::error::{SchemaError, SchemaResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Values substituted into `%name%` placeholders
pub type ScriptProperties = BTreeMap<String, String>;

/// Lifecycle step a script folder belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Create,
    Update,
    Drop,
}

impl Task {
    pub fn folder(&self) -> &'static str {
        match self {
            Task::Create => "create",
            Task::Update => "update",
            Task::Drop => "drop",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.folder())
    }
}

/// One versioned script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFile {
    name: String,
    version: u32,
    content: String,
}

impl UpdateFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> SchemaResult<Self> {
        let name = name.into();
        let version = extract_version(&name)?;
        Ok(Self {
            name,
            version,
            content: content.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Statements of the script with every placeholder filled in
    pub fn statements(&self, properties: &ScriptProperties) -> SchemaResult<Vec<String>> {
        let rendered = render(&self.name, &self.content, properties)?;
        Ok(split_statements(&rendered))
    }
}

impl std::fmt::Display for UpdateFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

fn extract_version(name: &str) -> SchemaResult<u32> {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name);
    let digits: String = file_name.chars().take_while(|c| c.is_ascii_digit()).collect();

    digits.parse().map_err(|_| {
        SchemaError::ScriptRepository(format!("no version number in script name {}", name))
    })
}

/// Replace `%name%` placeholders; values are quoted for SQL string literals
pub fn render(file: &str, script: &str, properties: &ScriptProperties) -> SchemaResult<String> {
    let re = regex::Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)%")
        .map_err(|e| SchemaError::Fatal(format!("placeholder pattern: {}", e)))?;

    let mut rendered = String::with_capacity(script.len());
    let mut last = 0;
    for caps in re.captures_iter(script) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = properties
            .get(name.as_str())
            .ok_or_else(|| SchemaError::MissingProperty {
                file: file.to_string(),
                name: name.as_str().to_string(),
            })?;

        rendered.push_str(&script[last..whole.start()]);
        rendered.push_str(&value.replace('\'', "''"));
        last = whole.end();
    }
    rendered.push_str(&script[last..]);

    Ok(rendered)
}

/// Split a script into statements, dropping comment lines
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(trimmed);

        if trimmed.ends_with(';') {
            current.pop();
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }

    statements
}

/// The scripts of one task, ascending by version
#[derive(Debug, Clone)]
pub struct UpdateFolder {
    task: Task,
    files: Vec<UpdateFile>,
}

impl UpdateFolder {
    pub fn new(task: Task, mut files: Vec<UpdateFile>) -> SchemaResult<Self> {
        files.sort_by_key(|f| f.version);
        if let Some(pair) = files.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(SchemaError::ScriptRepository(format!(
                "{} scripts {} and {} share version {}",
                task, pair[0].name, pair[1].name, pair[0].version
            )));
        }
        Ok(Self { task, files })
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn files(&self) -> &[UpdateFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Highest version in the folder, 0 when empty
    pub fn latest_version(&self) -> u32 {
        self.files.last().map(|f| f.version).unwrap_or(0)
    }

    /// Keep only the scripts newer than `installed`
    pub fn remove_applied_updates(&mut self, installed: u32) {
        self.files.retain(|f| f.version > installed);
    }

    /// Script at `index` in version order
    pub fn get(&self, index: usize) -> SchemaResult<&UpdateFile> {
        self.files.get(index).ok_or_else(|| {
            SchemaError::ScriptRepository(format!(
                "{} script #{} missing ({} available)",
                self.task,
                index + 1,
                self.files.len()
            ))
        })
    }
}

/// Source of script folders
pub trait ScriptRepository: Send + Sync {
    fn folder(&self, task: Task) -> SchemaResult<UpdateFolder>;
}

/// Scripts held in memory, by default the set compiled into the binary
#[derive(Debug, Clone, Default)]
pub struct ScriptSet {
    scripts: BTreeMap<(&'static str, String), String>,
}

impl ScriptSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scripts shipped under `schema/`
    pub fn bundled() -> Self {
        Self::new()
            .with(
                Task::Create,
                "0001_admin_user.sql",
                include_str!("../../schema/create/0001_admin_user.sql"),
            )
            .with(
                Task::Create,
                "0002_lock_default_admin.sql",
                include_str!("../../schema/create/0002_lock_default_admin.sql"),
            )
            .with(
                Task::Update,
                "0001_metrics_index.sql",
                include_str!("../../schema/update/0001_metrics_index.sql"),
            )
            .with(
                Task::Update,
                "0002_measurements.sql",
                include_str!("../../schema/update/0002_measurements.sql"),
            )
            .with(
                Task::Update,
                "0003_expiry_indexes.sql",
                include_str!("../../schema/update/0003_expiry_indexes.sql"),
            )
            .with(
                Task::Drop,
                "0001_restore_default_admin.sql",
                include_str!("../../schema/drop/0001_restore_default_admin.sql"),
            )
            .with(
                Task::Drop,
                "0002_drop_schema.sql",
                include_str!("../../schema/drop/0002_drop_schema.sql"),
            )
            .with(
                Task::Drop,
                "0003_drop_admin_user.sql",
                include_str!("../../schema/drop/0003_drop_admin_user.sql"),
            )
    }

    /// Builder: add or replace a script
    pub fn with(mut self, task: Task, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.scripts.insert((task.folder(), name.into()), content.into());
        self
    }
}

impl ScriptRepository for ScriptSet {
    fn folder(&self, task: Task) -> SchemaResult<UpdateFolder> {
        let files = self
            .scripts
            .iter()
            .filter(|((folder, _), _)| *folder == task.folder())
            .map(|((_, name), content)| UpdateFile::new(name.clone(), content.clone()))
            .collect::<SchemaResult<Vec<_>>>()?;
        UpdateFolder::new(task, files)
    }
}

/// Scripts read from `<root>/{create,update,drop}/*.sql`
#[derive(Debug, Clone)]
pub struct DirectoryScripts {
    root: PathBuf,
}

impl DirectoryScripts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ScriptRepository for DirectoryScripts {
    fn folder(&self, task: Task) -> SchemaResult<UpdateFolder> {
        let dir = self.root.join(task.folder());
        if !dir.is_dir() {
            return UpdateFolder::new(task, Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    SchemaError::ScriptRepository(format!("unreadable script name {:?}", path))
                })?
                .to_string();
            let content = std::fs::read_to_string(&path)?;
            files.push(UpdateFile::new(name, content)?);
        }

        tracing::debug!("Found {} {} scripts in {:?}", files.len(), task, dir);
        UpdateFolder::new(task, files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn props(pairs: &[(&str, &str)]) -> ScriptProperties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_version_from_name() {
        assert_eq!(UpdateFile::new("0001.sql", "").unwrap().version(), 1);
        assert_eq!(UpdateFile::new("0012_more.sql", "").unwrap().version(), 12);
        assert_eq!(UpdateFile::new("schema/update/0003_x.sql", "").unwrap().version(), 3);
        assert!(matches!(
            UpdateFile::new("readme.sql", ""),
            Err(SchemaError::ScriptRepository(_))
        ));
    }

    #[test]
    fn test_split_statements() {
        let script = "-- header\n\
                      CREATE TABLE a (\n  x INTEGER\n);\n\
                      \n\
                      INSERT INTO a VALUES (1);\n\
                      -- trailing note\n";

        assert_eq!(
            split_statements(script),
            vec!["CREATE TABLE a (\nx INTEGER\n)", "INSERT INTO a VALUES (1)"]
        );
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
        assert!(split_statements("-- nothing\n\n").is_empty());
    }

    #[test]
    fn test_render_placeholders() {
        let rendered = render(
            "0001.sql",
            "VALUES ('%user%', '%password%', %rf%)",
            &props(&[("user", "admin"), ("password", "it's"), ("rf", "3")]),
        )
        .unwrap();

        assert_eq!(rendered, "VALUES ('admin', 'it''s', 3)");
    }

    #[test]
    fn test_render_missing_property() {
        let err = render("0001.sql", "'%user%'", &ScriptProperties::new()).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingProperty { file, name } if file == "0001.sql" && name == "user"
        ));
    }

    #[test]
    fn test_folder_ordering_and_pruning() {
        let scripts = ScriptSet::new()
            .with(Task::Update, "0003_c.sql", "")
            .with(Task::Update, "0001_a.sql", "")
            .with(Task::Update, "0002_b.sql", "")
            .with(Task::Drop, "0001_x.sql", "");

        let mut folder = scripts.folder(Task::Update).unwrap();
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.latest_version(), 3);
        assert_eq!(folder.get(0).unwrap().name(), "0001_a.sql");

        folder.remove_applied_updates(1);
        let versions: Vec<u32> = folder.files().iter().map(|f| f.version()).collect();
        assert_eq!(versions, vec![2, 3]);

        folder.remove_applied_updates(3);
        assert!(folder.is_empty());
        assert_eq!(folder.latest_version(), 0);
        assert!(folder.get(0).is_err());
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let scripts = ScriptSet::new()
            .with(Task::Update, "0001_a.sql", "")
            .with(Task::Update, "0001_b.sql", "");
        assert!(matches!(
            scripts.folder(Task::Update),
            Err(SchemaError::ScriptRepository(_))
        ));
    }

    #[test]
    fn test_bundled_scripts() {
        let scripts = ScriptSet::bundled();
        assert_eq!(scripts.folder(Task::Create).unwrap().len(), 2);
        assert_eq!(scripts.folder(Task::Update).unwrap().latest_version(), 3);
        assert_eq!(scripts.folder(Task::Drop).unwrap().len(), 3);

        let create = scripts.folder(Task::Create).unwrap();
        let statements = create
            .get(0)
            .unwrap()
            .statements(&props(&[("admin_username", "ops"), ("admin_password", "pw")]))
            .unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[1].contains("'ops', 'pw'"));
    }

    #[test]
    fn test_directory_scripts() {
        let dir = tempdir().unwrap();
        let update = dir.path().join("update");
        std::fs::create_dir_all(&update).unwrap();
        std::fs::write(update.join("0002_b.sql"), "SELECT 2;").unwrap();
        std::fs::write(update.join("0001_a.sql"), "SELECT 1;").unwrap();
        std::fs::write(update.join("notes.txt"), "ignored").unwrap();

        let scripts = DirectoryScripts::new(dir.path());
        let folder = scripts.folder(Task::Update).unwrap();
        assert_eq!(folder.len(), 2);
        assert_eq!(folder.get(0).unwrap().content(), "SELECT 1;");

        assert!(scripts.folder(Task::Create).unwrap().is_empty());
    }
}
