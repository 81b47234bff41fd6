use super::{AcceptPolicy, DroppedFile, Rejection, RejectReason, RejectionList, SubmitError, same_file_name};
use crate::breakdown::parse_breakdown;
use crate::model::BreakdownMap;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ParsedBreakdown {
    pub name: String,
    pub map: BreakdownMap,
}

/// Single-file intake for the structured breakdown document. The file is
/// parsed and validated on drop, so a held file is always submittable.
#[derive(Debug, Clone)]
pub struct BreakdownIntake {
    policy: AcceptPolicy,
    file: Option<ParsedBreakdown>,
    rejected: RejectionList,
}

impl BreakdownIntake {
    pub fn new(policy: AcceptPolicy) -> Self {
        Self {
            policy,
            file: None,
            rejected: RejectionList::default(),
        }
    }

    pub fn file(&self) -> Option<&ParsedBreakdown> {
        self.file.as_ref()
    }

    pub fn rejected(&self) -> &RejectionList {
        &self.rejected
    }

    pub fn on_drop(&mut self, files: Vec<DroppedFile>) {
        let outcome = self.policy.classify(files);
        let mut rejected = outcome.rejected;

        for file in outcome.accepted {
            let parsed = file
                .source
                .read_to_string()
                .map_err(|err| RejectReason::Unreadable(err.to_string()))
                .and_then(|text| parse_breakdown(&text).map_err(RejectReason::Breakdown));
            match parsed {
                Ok(map) => {
                    info!(file = %file.name, segments = map.len(), "breakdown parsed");
                    self.file = Some(ParsedBreakdown {
                        name: file.name,
                        map,
                    });
                }
                Err(reason) => {
                    warn!(file = %file.name, code = reason.code(), "breakdown rejected: {reason}");
                    rejected.push(Rejection::new(&file.name, reason));
                }
            }
        }

        if !rejected.is_empty() {
            self.rejected.replace(rejected);
        }
    }

    pub fn submit(&self) -> Result<BreakdownMap, SubmitError> {
        self.file
            .as_ref()
            .map(|file| file.map.clone())
            .ok_or(SubmitError::NothingToSubmit)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if self
            .file
            .as_ref()
            .is_some_and(|file| same_file_name(&file.name, name))
        {
            self.file = None;
            return true;
        }
        false
    }

    pub fn remove_rejected(&mut self, name: &str) -> bool {
        self.rejected.remove(name)
    }

    /// Adds rejections found before classification (unreadable paths).
    pub fn push_rejections(&mut self, rejections: Vec<Rejection>) {
        self.rejected.extend(rejections);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intake() -> BreakdownIntake {
        BreakdownIntake::new(AcceptPolicy::breakdown(10.0))
    }

    #[test]
    fn valid_drop_is_submittable() {
        let mut intake = intake();
        intake.on_drop(vec![DroppedFile::from_bytes(
            "mural.bkdn",
            br##"{"0": {"color": "#112233"}, "4": {"markdown": ["verse"]}}"##.to_vec(),
        )]);

        let map = intake.submit().expect("submit");
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![0, 4]);
        assert!(intake.rejected().is_empty());
    }

    #[test]
    fn invalid_document_is_rejected_with_parse_code() {
        let mut intake = intake();
        intake.on_drop(vec![DroppedFile::from_bytes(
            "broken.json",
            br#"{"3": {}}"#.to_vec(),
        )]);

        assert!(intake.file().is_none());
        let rejection = intake.rejected().iter().next().expect("rejection");
        assert_eq!(rejection.codes(), vec!["breakdown-missing-initial"]);
        assert_eq!(intake.submit().expect_err("nothing"), SubmitError::NothingToSubmit);
    }

    #[test]
    fn later_drop_replaces_held_file() {
        let mut intake = intake();
        intake.on_drop(vec![DroppedFile::from_bytes("a.json", br#"{"0": {}}"#.to_vec())]);
        intake.on_drop(vec![DroppedFile::from_bytes(
            "b.json",
            br#"{"0": {}, "2": {"mBelow": true}}"#.to_vec(),
        )]);

        assert_eq!(intake.file().map(|file| file.name.as_str()), Some("b.json"));
        assert!(!intake.remove("a.json"));
        assert!(intake.remove("b.json"));
        assert!(intake.file().is_none());
    }
}
