use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Result, bail};
use clap::ValueEnum;

use crate::client::conversation::Turn;
use crate::model::QuestionRecord;

pub const DEFAULT_GRID_ROWS: u32 = 6;
pub const DEFAULT_GRID_COLS: u32 = 6;
pub const DOTS_SUFFIX: &str = "_dots.jpg";

const OUTPUT_FORMAT_RULE: &str =
    "Finally, you must conclude your answer in format [[ANSWER]], such as [[true]] or [[false]].";
const COT_TRIGGER: &str = "\n Let's think step by step";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, ValueEnum)]
pub enum Mode {
    Direct,
    Cot,
    Scaffold,
    #[value(name = "scaffold_single")]
    ScaffoldSingle,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Cot => "cot",
            Self::Scaffold => "scaffold",
            Self::ScaffoldSingle => "scaffold_single",
        }
    }

    pub fn strategy(self) -> Strategy {
        match self {
            Self::Direct => direct,
            Self::Cot => chain_of_thought,
            Self::Scaffold => scaffold,
            Self::ScaffoldSingle => scaffold_single,
        }
    }

    pub fn render(self, record: &QuestionRecord, grid: GridShape) -> Prompt {
        (self.strategy())(record, grid)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match Mode::value_variants()
            .iter()
            .find(|mode| mode.as_str() == raw.trim())
        {
            Some(mode) => Ok(*mode),
            None => bail!("invalid mode: {raw}"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GridShape {
    pub rows: u32,
    pub cols: u32,
}

impl Default for GridShape {
    fn default() -> Self {
        Self {
            rows: DEFAULT_GRID_ROWS,
            cols: DEFAULT_GRID_COLS,
        }
    }
}

impl GridShape {
    pub fn new(rows: u32, cols: u32) -> Result<Self> {
        if rows == 0 || cols == 0 {
            bail!("grid shape must be at least 1 * 1, got {rows} * {cols}");
        }
        Ok(Self { rows, cols })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub image_paths: Vec<PathBuf>,
    pub question: String,
    pub history: Vec<Turn>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Ready(RenderedPrompt),
    Skip { missing: PathBuf },
}

pub type Strategy = fn(&QuestionRecord, GridShape) -> Prompt;

fn direct(record: &QuestionRecord, _grid: GridShape) -> Prompt {
    Prompt::Ready(RenderedPrompt {
        image_paths: vec![PathBuf::from(&record.image_path)],
        question: record.question.clone(),
        history: output_format_history(),
    })
}

fn chain_of_thought(record: &QuestionRecord, _grid: GridShape) -> Prompt {
    Prompt::Ready(RenderedPrompt {
        image_paths: vec![PathBuf::from(&record.image_path)],
        question: format!("{}{COT_TRIGGER}", record.question),
        history: output_format_history(),
    })
}

fn scaffold(record: &QuestionRecord, grid: GridShape) -> Prompt {
    let primary = PathBuf::from(&record.image_path);
    let dots = match existing_dots_image(&primary) {
        Ok(path) => path,
        Err(missing) => return Prompt::Skip { missing },
    };

    Prompt::Ready(RenderedPrompt {
        image_paths: vec![primary, dots],
        question: record.question.clone(),
        history: vec![Turn::system(coordinate_guidelines(
            grid,
            "I will provide you with two images of the same scene. The second image is overlaid",
        ))],
    })
}

fn scaffold_single(record: &QuestionRecord, grid: GridShape) -> Prompt {
    let dots = match existing_dots_image(Path::new(&record.image_path)) {
        Ok(path) => path,
        Err(missing) => return Prompt::Skip { missing },
    };

    Prompt::Ready(RenderedPrompt {
        image_paths: vec![dots],
        question: record.question.clone(),
        history: vec![Turn::system(coordinate_guidelines(
            grid,
            "The image is overlaid",
        ))],
    })
}

fn output_format_history() -> Vec<Turn> {
    vec![Turn::system(OUTPUT_FORMAT_RULE)]
}

fn coordinate_guidelines(grid: GridShape, opening: &str) -> String {
    format!(
        "{opening} with a dot matrix of a shape of {rows} * {cols} to help you with your task, and each dot is labeled with two-dimensional coordinates (x,y).\n \
         1. When you mention any key objects in the image, first output their nearest coordinates then identify them.\n \
         2. You use the coordinates to determine the spatial relationships of the objects. Within each column, the x-coordinate increases from top to bottom, and within each row, the y-coordinate increases from left to right.\n \
         3. You can search and reason region by region with the help of the dots.\n \
         4. {OUTPUT_FORMAT_RULE}",
        rows = grid.rows,
        cols = grid.cols,
    )
}

pub fn dots_image_path(image_path: &Path) -> Option<PathBuf> {
    let raw = image_path.to_str()?;
    let stem = raw.strip_suffix(".jpg")?;
    Some(PathBuf::from(format!("{stem}{DOTS_SUFFIX}")))
}

fn existing_dots_image(image_path: &Path) -> Result<PathBuf, PathBuf> {
    match dots_image_path(image_path) {
        Some(dots) if dots.is_file() => Ok(dots),
        Some(dots) => Err(dots),
        None => {
            let stem = image_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            Err(image_path.with_file_name(format!("{stem}{DOTS_SUFFIX}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::conversation::ContentBlock;
    use crate::model::QuestionId;
    use std::fs;

    fn record(image_path: &Path) -> QuestionRecord {
        QuestionRecord {
            question_id: QuestionId::Text("q1".to_string()),
            image_path: image_path.display().to_string(),
            question: "Is there a cat?".to_string(),
            answer: serde_json::Value::from("true"),
        }
    }

    fn system_text(prompt: &RenderedPrompt) -> &str {
        match &prompt.history[0].content[0] {
            ContentBlock::Text { text } => text,
            ContentBlock::ImageUrl { .. } => panic!("system turn must be text"),
        }
    }

    fn ready(prompt: Prompt) -> RenderedPrompt {
        match prompt {
            Prompt::Ready(rendered) => rendered,
            Prompt::Skip { missing } => panic!("unexpected skip: {}", missing.display()),
        }
    }

    #[test]
    fn mode_parses_known_names_and_rejects_unknown() {
        assert_eq!("scaffold_single".parse::<Mode>().unwrap(), Mode::ScaffoldSingle);
        assert_eq!("cot".parse::<Mode>().unwrap(), Mode::Cot);
        let err = "Scaffold".parse::<Mode>().unwrap_err();
        assert!(err.to_string().contains("invalid mode"));
        for mode in Mode::value_variants() {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), *mode);
        }
    }

    #[test]
    fn dots_image_path_replaces_jpg_suffix_only() {
        assert_eq!(
            dots_image_path(Path::new("data/img1.jpg")),
            Some(PathBuf::from("data/img1_dots.jpg"))
        );
        assert_eq!(
            dots_image_path(Path::new("data.jpg/img1.jpg")),
            Some(PathBuf::from("data.jpg/img1_dots.jpg"))
        );
        assert_eq!(dots_image_path(Path::new("data/img1.png")), None);
    }

    #[test]
    fn direct_and_cot_use_primary_image_with_format_instruction() {
        let rec = record(Path::new("img1.jpg"));

        let direct = ready(Mode::Direct.render(&rec, GridShape::default()));
        assert_eq!(direct.image_paths, vec![PathBuf::from("img1.jpg")]);
        assert_eq!(direct.question, "Is there a cat?");
        assert_eq!(system_text(&direct), OUTPUT_FORMAT_RULE);

        let cot = ready(Mode::Cot.render(&rec, GridShape::default()));
        assert_eq!(cot.image_paths, direct.image_paths);
        assert_eq!(cot.question, "Is there a cat?\n Let's think step by step");
        assert_eq!(cot.history, direct.history);
    }

    #[test]
    fn scaffold_modes_skip_when_dots_image_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("img1.jpg");
        fs::write(&image, b"x").unwrap();
        let rec = record(&image);

        for mode in [Mode::Scaffold, Mode::ScaffoldSingle] {
            assert_eq!(
                mode.render(&rec, GridShape::default()),
                Prompt::Skip {
                    missing: dir.path().join("img1_dots.jpg")
                }
            );
        }
    }

    #[test]
    fn scaffold_sends_both_images_and_grid_guidelines() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("img1.jpg");
        let dots = dir.path().join("img1_dots.jpg");
        fs::write(&image, b"x").unwrap();
        fs::write(&dots, b"y").unwrap();
        let rec = record(&image);
        let grid = GridShape::new(4, 5).unwrap();

        let both = ready(Mode::Scaffold.render(&rec, grid));
        assert_eq!(both.image_paths, vec![image.clone(), dots.clone()]);
        assert_eq!(both.question, "Is there a cat?");
        let text = system_text(&both);
        assert!(text.starts_with("I will provide you with two images of the same scene."));
        assert!(text.contains("a shape of 4 * 5"));
        assert!(text.contains("\n 4. Finally, you must conclude"));

        let single = ready(Mode::ScaffoldSingle.render(&rec, grid));
        assert_eq!(single.image_paths, vec![dots]);
        assert!(system_text(&single).starts_with("The image is overlaid with a dot matrix"));
    }

    #[test]
    fn grid_shape_rejects_zero_dimensions() {
        assert!(GridShape::new(0, 6).is_err());
        assert_eq!(GridShape::new(6, 6).unwrap(), GridShape::default());
    }
}
