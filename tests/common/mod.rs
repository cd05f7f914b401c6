#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Input/output directory pair mirroring the on-disk layout the binary
/// expects, with helpers for writing the usual fixture files.
pub struct Workspace {
    _root: TempDir,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let input_dir = root.path().join("AI_Usage_Input");
        let output_dir = root.path().join("AI_Usage_Output");
        fs::create_dir_all(&input_dir).unwrap();
        fs::create_dir_all(&output_dir).unwrap();
        Self { _root: root, input_dir, output_dir }
    }

    pub fn write_input(&self, name: &str, content: &str) -> PathBuf {
        let path = self.input_dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_roster(&self, rows: &[(&str, &str)]) -> PathBuf {
        let mut content = String::from("email,chapter,Current Squad,Manager,Target_Threshold\n");
        for (email, chapter) in rows {
            content.push_str(&format!("{email},{chapter},Squad,Lead,\n"));
        }
        self.write_input("useremails.csv", &content)
    }

    pub fn write_mappings(&self, pairs: &[(&str, &str)]) -> PathBuf {
        let body = pairs
            .iter()
            .map(|(login, email)| format!("\"{login}\": \"{email}\""))
            .collect::<Vec<_>>()
            .join(", ");
        self.write_input("email_to_github_mappings.json", &format!("{{{body}}}"))
    }

    pub fn write_github_ndjson(&self, lines: &[String]) -> PathBuf {
        self.write_input("githubusage.json", &(lines.join("\n") + "\n"))
    }

    pub fn trends_path(&self) -> PathBuf {
        self.output_dir.join("fs-eng-ai-usage-trends.csv")
    }
}

pub fn github_line(login: &str, day: &str, requests: u64) -> String {
    format!(
        r#"{{"user_login":"{login}","day":"{day}","user_initiated_interaction_count":{requests}}}"#
    )
}

pub fn read_csv_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|record| record.unwrap().iter().map(str::to_string).collect())
        .collect()
}
