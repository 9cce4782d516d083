pub mod gsm8k;
pub mod hellaswag;
pub mod medmcqa;
pub mod medqa;
pub mod mmlu;
pub mod mmlu_pro;
pub mod pubmedqa;
pub mod usmle;
