use crate::error::Result;
use crate::grid::{build_grid, WellGrid};
use std::collections::HashMap;

/// A standard plate geometry: named, ordered row and column label sets.
#[derive(Clone, Debug)]
pub struct PlateFormat {
    name: String,
    description: String,
    rows: Vec<String>,
    cols: Vec<String>,
}

impl PlateFormat {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn cols(&self) -> &[String] {
        &self.cols
    }

    pub fn n_wells(&self) -> usize {
        self.rows.len() * self.cols.len()
    }

    pub fn grid(&self) -> Result<WellGrid> {
        build_grid(&self.rows, &self.cols)
    }
}

/// Catalogue of the standard plate formats. 1536-well plates ship in two
/// row-naming conventions, one per major instrument vendor: a single
/// alphabetic run (A..Z, AA..AF) and a paired-letter scheme (Aa..Hd).
#[derive(Clone, Debug)]
pub struct PlateFormats(HashMap<String, PlateFormat>);

fn letter_run(n: usize) -> Vec<String> {
    // A..Z, then AA, AB, ...
    (0..n)
        .map(|i| {
            let letter = |k: usize| (b'A' + (k % 26) as u8) as char;
            if i < 26 {
                letter(i).to_string()
            } else {
                format!("A{}", letter(i - 26))
            }
        })
        .collect()
}

fn paired_letters() -> Vec<String> {
    let mut rows = Vec::with_capacity(32);
    for upper in 0..8u8 {
        for lower in 0..4u8 {
            rows.push(format!(
                "{}{}",
                (b'A' + upper) as char,
                (b'a' + lower) as char
            ));
        }
    }
    rows
}

fn number_run(n: usize) -> Vec<String> {
    (1..=n).map(|i| i.to_string()).collect()
}

impl Default for PlateFormats {
    fn default() -> Self {
        let formats = [
            PlateFormat {
                name: "96".to_string(),
                description: "96-well plate, rows A-H, columns 1-12".to_string(),
                rows: letter_run(8),
                cols: number_run(12),
            },
            PlateFormat {
                name: "384".to_string(),
                description: "384-well plate, rows A-P, columns 1-24".to_string(),
                rows: letter_run(16),
                cols: number_run(24),
            },
            PlateFormat {
                name: "1536".to_string(),
                description: "1536-well plate, rows A-AF, columns 1-48".to_string(),
                rows: letter_run(32),
                cols: number_run(48),
            },
            PlateFormat {
                name: "1536-paired".to_string(),
                description: "1536-well plate, paired-letter rows Aa-Hd, columns 1-48".to_string(),
                rows: paired_letters(),
                cols: number_run(48),
            },
        ];
        Self(
            formats
                .into_iter()
                .map(|f| (f.name.clone(), f))
                .collect(),
        )
    }
}

impl PlateFormats {
    pub fn get(&self, name: &str) -> Option<&PlateFormat> {
        self.0.get(name)
    }

    pub fn names_sorted(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.keys().cloned().collect();
        names.sort();
        names
    }
}
