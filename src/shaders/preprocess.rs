// fluid-cursor - GPU fluid simulation cursor effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! `#define` / `#ifdef` / `#ifndef` / `#else` / `#endif` over WGSL text.
//!
//! Directive lines are replaced by blank lines so compiler diagnostics keep
//! pointing at the right line of the original source.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreprocessError {
    #[error("line {0}: #else without #ifdef")]
    StrayElse(usize),
    #[error("line {0}: duplicate #else")]
    DuplicateElse(usize),
    #[error("line {0}: #endif without #ifdef")]
    StrayEndif(usize),
    #[error("line {0}: directive is missing its keyword")]
    MissingKeyword(usize),
    #[error("{0} unterminated #ifdef block(s)")]
    Unterminated(usize),
}

struct Block {
    taken: bool,
    seen_else: bool,
}

pub fn preprocess(source: &str) -> Result<String, PreprocessError> {
    let mut defines: HashSet<&str> = HashSet::new();
    let mut stack: Vec<Block> = Vec::new();
    let mut out = String::with_capacity(source.len());

    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim_start();
        let active = stack.iter().all(|b| b.taken);

        if let Some(rest) = trimmed.strip_prefix('#') {
            let mut words = rest.split_whitespace();
            let directive = words.next().unwrap_or("");
            let keyword = words.next();

            match directive {
                "define" => {
                    let keyword = keyword.ok_or(PreprocessError::MissingKeyword(line_no))?;
                    if active {
                        defines.insert(keyword);
                    }
                }
                "ifdef" | "ifndef" => {
                    let keyword = keyword.ok_or(PreprocessError::MissingKeyword(line_no))?;
                    let defined = defines.contains(keyword);
                    stack.push(Block {
                        taken: if directive == "ifdef" { defined } else { !defined },
                        seen_else: false,
                    });
                }
                "else" => {
                    let block = stack.last_mut().ok_or(PreprocessError::StrayElse(line_no))?;
                    if block.seen_else {
                        return Err(PreprocessError::DuplicateElse(line_no));
                    }
                    block.seen_else = true;
                    block.taken = !block.taken;
                }
                "endif" => {
                    stack.pop().ok_or(PreprocessError::StrayEndif(line_no))?;
                }
                _ => {
                    // Not ours; hand it to the compiler untouched.
                    if active {
                        out.push_str(line);
                    }
                }
            }
            out.push('\n');
            continue;
        }

        if active {
            out.push_str(line);
        }
        out.push('\n');
    }

    if !stack.is_empty() {
        return Err(PreprocessError::Unterminated(stack.len()));
    }
    Ok(out)
}
