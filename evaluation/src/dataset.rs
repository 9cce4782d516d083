use std::fs::File;
use std::io::BufReader;
use std::marker::PhantomData;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct DatasetEntry<T> {
    pub id: usize,
    pub content: T,
}

pub trait DatasetContent: Sized {
    fn parse_record(record: &csv::StringRecord) -> Result<Self>;
}

/// PubMedQA (pqa_labeled) row: question, pre-joined context, final decision.
#[derive(Debug, Clone)]
pub struct PubMedQaContent {
    pub question: String,
    pub context: String,
    pub final_decision: String,
}

impl DatasetContent for PubMedQaContent {
    fn parse_record(record: &csv::StringRecord) -> Result<Self> {
        Ok(Self {
            question: record.get(0).context("Missing question field")?.to_string(),
            context: record.get(1).context("Missing context field")?.to_string(),
            final_decision: record
                .get(2)
                .context("Missing final_decision field")?
                .trim()
                .to_lowercase(),
        })
    }
}

/// MedMCQA row: question, four options, correct option index (0 = A).
#[derive(Debug, Clone)]
pub struct MedMcqaContent {
    pub question: String,
    pub options: [String; 4],
    pub answer_index: usize,
}

impl MedMcqaContent {
    pub fn answer_letter(&self) -> char {
        (b'A' + self.answer_index as u8) as char
    }
}

impl DatasetContent for MedMcqaContent {
    fn parse_record(record: &csv::StringRecord) -> Result<Self> {
        let option = |idx: usize, name: &str| -> Result<String> {
            Ok(record
                .get(idx)
                .context(format!("Missing {} field", name))?
                .to_string())
        };
        let answer_index: usize = record
            .get(5)
            .context("Missing cop field")?
            .trim()
            .parse()
            .context("Failed to parse correct option index")?;
        if answer_index >= 4 {
            anyhow::bail!("Correct option index {} out of range", answer_index);
        }
        Ok(Self {
            question: record.get(0).context("Missing question field")?.to_string(),
            options: [
                option(1, "opa")?,
                option(2, "opb")?,
                option(3, "opc")?,
                option(4, "opd")?,
            ],
            answer_index,
        })
    }
}

/// MedQA / USMLE row: clinical vignette, four options, answer letter.
#[derive(Debug, Clone)]
pub struct UsmleContent {
    pub question: String,
    pub options: [String; 4],
    pub answer_letter: String,
}

impl DatasetContent for UsmleContent {
    fn parse_record(record: &csv::StringRecord) -> Result<Self> {
        let option = |idx: usize, name: &str| -> Result<String> {
            Ok(record
                .get(idx)
                .context(format!("Missing option {} field", name))?
                .to_string())
        };
        Ok(Self {
            question: record.get(0).context("Missing question field")?.to_string(),
            options: [option(1, "A")?, option(2, "B")?, option(3, "C")?, option(4, "D")?],
            answer_letter: record
                .get(5)
                .context("Missing answer_idx field")?
                .trim()
                .to_uppercase(),
        })
    }
}

/// MMLU row: question, four choices, answer index. The subset tag is filled
/// in by the task after loading, one file per subset.
#[derive(Debug, Clone)]
pub struct MmluContent {
    pub subject: String,
    pub question: String,
    pub choices: Vec<String>,
    pub answer_index: usize,
}

impl DatasetContent for MmluContent {
    fn parse_record(record: &csv::StringRecord) -> Result<Self> {
        let choice = |idx: usize| -> Result<String> {
            Ok(record
                .get(idx)
                .context(format!("Missing choice {} field", idx - 1))?
                .to_string())
        };
        let choices = vec![choice(1)?, choice(2)?, choice(3)?, choice(4)?];
        let answer_index: usize = record
            .get(5)
            .context("Missing answer field")?
            .trim()
            .parse()
            .context("Failed to parse answer index")?;
        if answer_index >= choices.len() {
            anyhow::bail!("Answer index {} out of range", answer_index);
        }
        Ok(Self {
            subject: String::new(),
            question: record.get(0).context("Missing question field")?.to_string(),
            choices,
            answer_index,
        })
    }
}

/// MMLU-Pro row: question, up to ten options (pipe-separated), answer index,
/// category.
#[derive(Debug, Clone)]
pub struct MmluProContent {
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: usize,
    pub category: String,
}

impl DatasetContent for MmluProContent {
    fn parse_record(record: &csv::StringRecord) -> Result<Self> {
        let options: Vec<String> = record
            .get(1)
            .context("Missing options field")?
            .split('|')
            .map(|s| s.trim().to_string())
            .collect();
        let answer_index: usize = record
            .get(2)
            .context("Missing answer_index field")?
            .trim()
            .parse()
            .context("Failed to parse answer index")?;
        if answer_index >= options.len() {
            anyhow::bail!("Answer index {} out of range", answer_index);
        }
        Ok(Self {
            question: record.get(0).context("Missing question field")?.to_string(),
            options,
            answer_index,
            category: record.get(3).context("Missing category field")?.to_string(),
        })
    }
}

/// GSM8K row: question and the reference rationale ending in `#### n`.
#[derive(Debug, Clone)]
pub struct Gsm8kContent {
    pub question: String,
    pub answer: String,
}

impl Gsm8kContent {
    /// Ground-truth number after the final `####` marker.
    pub fn ground_truth(&self) -> String {
        self.answer
            .rsplit("####")
            .next()
            .unwrap_or(&self.answer)
            .trim()
            .to_string()
    }
}

impl DatasetContent for Gsm8kContent {
    fn parse_record(record: &csv::StringRecord) -> Result<Self> {
        Ok(Self {
            question: record.get(0).context("Missing question field")?.to_string(),
            answer: record.get(1).context("Missing answer field")?.to_string(),
        })
    }
}

/// HellaSwag row: context, four candidate endings, gold ending index.
#[derive(Debug, Clone)]
pub struct HellaswagContent {
    pub context: String,
    pub endings: [String; 4],
    pub label: usize,
}

impl DatasetContent for HellaswagContent {
    fn parse_record(record: &csv::StringRecord) -> Result<Self> {
        let ending = |idx: usize| -> Result<String> {
            Ok(record
                .get(idx)
                .context(format!("Missing ending {} field", idx - 1))?
                .to_string())
        };
        let label: usize = record
            .get(5)
            .context("Missing label field")?
            .trim()
            .parse()
            .context("Failed to parse label")?;
        if label >= 4 {
            anyhow::bail!("Ending label {} out of range", label);
        }
        Ok(Self {
            context: record.get(0).context("Missing ctx field")?.to_string(),
            endings: [ending(1)?, ending(2)?, ending(3)?, ending(4)?],
            label,
        })
    }
}

#[derive(Debug)]
pub struct DatasetLoader<T: DatasetContent> {
    file_path: String,
    url: String,
    _phantom: PhantomData<T>,
}

impl<T: DatasetContent> DatasetLoader<T> {
    pub fn new(file_path: &str, url: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            url: url.to_string(),
            _phantom: PhantomData,
        }
    }

    fn ensure_file_exists(&self) -> Result<()> {
        if !std::path::Path::new(&self.file_path).exists() {
            println!("Dataset not found, downloading...");
            let response = reqwest::blocking::get(&self.url)
                .context("Failed to download dataset")?
                .error_for_status()
                .context("Dataset download returned an error status")?;
            let mut file = File::create(&self.file_path)
                .context("Failed to create file")?;
            std::io::copy(&mut response.bytes()?.as_ref(), &mut file)
                .context("Failed to write dataset to file")?;
            println!("Dataset downloaded successfully.");
        }
        Ok(())
    }

    fn read_csv(&self, limit: Option<usize>, start_from: usize) -> Result<Vec<DatasetEntry<T>>> {
        let file = File::open(&self.file_path)
            .context("Failed to open dataset file")?;
        let reader = BufReader::new(file);
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let mut entries = Vec::new();
        for (idx, result) in csv_reader.records().enumerate() {
            if idx < start_from {
                continue;
            }

            if let Some(limit) = limit {
                if entries.len() >= limit {
                    break;
                }
            }

            let record = result.context("Failed to read CSV record")?;
            entries.push(DatasetEntry {
                id: idx,
                content: T::parse_record(&record)?,
            });
        }

        if entries.is_empty() {
            anyhow::bail!("No entries found in the dataset");
        }

        println!("Loaded {} entries from dataset", entries.len());

        Ok(entries)
    }

    pub fn load_or_download(&self, limit: Option<usize>, start_from: usize) -> Result<Vec<DatasetEntry<T>>> {
        self.ensure_file_exists()?;
        self.read_csv(limit, start_from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_load_pubmedqa_csv() -> Result<()> {
        let dir = tempdir()?;
        let path = write_csv(
            &dir,
            "pubmedqa.csv",
            "question,context,final_decision\n\
             Is drug X effective?,A trial showed a 20% reduction.,YES\n\
             Does Y cause Z?,No association was found.,no\n",
        );

        let loader = DatasetLoader::<PubMedQaContent>::new(&path, "http://example.com/x.csv");
        let entries = loader.load_or_download(None, 0)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content.final_decision, "yes");
        assert_eq!(entries[1].content.question, "Does Y cause Z?");
        Ok(())
    }

    #[test]
    fn test_limit_and_start_from() -> Result<()> {
        let dir = tempdir()?;
        let path = write_csv(
            &dir,
            "gsm8k.csv",
            "question,answer\nq1,#### 1\nq2,#### 2\nq3,#### 3\nq4,#### 4\n",
        );

        let loader = DatasetLoader::<Gsm8kContent>::new(&path, "http://example.com/x.csv");
        let entries = loader.load_or_download(Some(2), 1)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content.question, "q2");
        assert_eq!(entries[1].content.ground_truth(), "3");
        Ok(())
    }

    #[test]
    fn test_empty_dataset_bails() -> Result<()> {
        let dir = tempdir()?;
        let path = write_csv(&dir, "empty.csv", "question,answer\n");
        let loader = DatasetLoader::<Gsm8kContent>::new(&path, "http://example.com/x.csv");
        assert!(loader.load_or_download(None, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_medmcqa_record() -> Result<()> {
        let record = csv::StringRecord::from(vec![
            "Which test confirms hereditary spherocytosis?",
            "Coombs test",
            "Osmotic fragility test",
            "Hb electrophoresis",
            "Bone marrow aspiration",
            "1",
        ]);
        let content = MedMcqaContent::parse_record(&record)?;
        assert_eq!(content.answer_index, 1);
        assert_eq!(content.answer_letter(), 'B');
        assert_eq!(content.options[1], "Osmotic fragility test");
        Ok(())
    }

    #[test]
    fn test_parse_mmlu_pro_record() -> Result<()> {
        let record = csv::StringRecord::from(vec![
            "Most appropriate initial treatment?",
            "Oral prednisone|Topical hydrocortisone|IV diphenhydramine",
            "1",
            "health",
        ]);
        let content = MmluProContent::parse_record(&record)?;
        assert_eq!(content.options.len(), 3);
        assert_eq!(content.options[1], "Topical hydrocortisone");
        assert_eq!(content.category, "health");
        Ok(())
    }

    #[test]
    fn test_out_of_range_answer_index_rejected() {
        let medmcqa = csv::StringRecord::from(vec!["q", "a", "b", "c", "d", "4"]);
        assert!(MedMcqaContent::parse_record(&medmcqa).is_err());

        let mmlu = csv::StringRecord::from(vec!["q", "a", "b", "c", "d", "7"]);
        assert!(MmluContent::parse_record(&mmlu).is_err());

        let mmlu_pro = csv::StringRecord::from(vec!["q", "a|b|c", "3", "health"]);
        assert!(MmluProContent::parse_record(&mmlu_pro).is_err());

        let hellaswag = csv::StringRecord::from(vec!["ctx", "e0", "e1", "e2", "e3", "9"]);
        assert!(HellaswagContent::parse_record(&hellaswag).is_err());
    }

    #[test]
    fn test_parse_hellaswag_record() -> Result<()> {
        let record = csv::StringRecord::from(vec![
            "A woman holds scissors up to her hair.",
            "She cuts her own hair.",
            "She stands up and walks away.",
            "She eats the scissors.",
            "She paints the scissors red.",
            "0",
        ]);
        let content = HellaswagContent::parse_record(&record)?;
        assert_eq!(content.label, 0);
        assert_eq!(content.endings[0], "She cuts her own hair.");
        Ok(())
    }
}
