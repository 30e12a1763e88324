//! Page loaders.
//!
//! Each loader issues its reads concurrently and keeps every outcome, so a
//! page can render whatever succeeded next to an error for what did not.

use tally_core::{EntityId, Insight, Page, PageRequest, Submission, Survey};

use crate::client::TallyClient;
use crate::error::{ClientError, ClientResult};

/// Admin dashboard: one page of surveys plus recent insights.
#[derive(Debug)]
pub struct DashboardPage {
    pub surveys: ClientResult<Page<Survey>>,
    pub insights: ClientResult<Page<Insight>>,
}

/// A survey with one page of its submissions.
#[derive(Debug)]
pub struct SurveySubmissionsPage {
    pub survey: ClientResult<Survey>,
    pub submissions: ClientResult<Page<Submission>>,
}

/// A survey with one page of its insights.
#[derive(Debug)]
pub struct SurveyInsightsPage {
    pub survey: ClientResult<Survey>,
    pub insights: ClientResult<Page<Insight>>,
}

impl DashboardPage {
    pub fn errors(&self) -> Vec<&ClientError> {
        collect_errors([self.surveys.as_ref().err(), self.insights.as_ref().err()])
    }
}

impl SurveySubmissionsPage {
    pub fn errors(&self) -> Vec<&ClientError> {
        collect_errors([self.survey.as_ref().err(), self.submissions.as_ref().err()])
    }
}

impl SurveyInsightsPage {
    pub fn errors(&self) -> Vec<&ClientError> {
        collect_errors([self.survey.as_ref().err(), self.insights.as_ref().err()])
    }
}

fn collect_errors<const N: usize>(errors: [Option<&ClientError>; N]) -> Vec<&ClientError> {
    errors.into_iter().flatten().collect()
}

pub async fn load_dashboard(client: &TallyClient, surveys: PageRequest) -> DashboardPage {
    let (surveys, insights) = tokio::join!(
        client.list_surveys(surveys),
        client.list_insights(None, PageRequest::default()),
    );
    log_failures("dashboard", [surveys.as_ref().err(), insights.as_ref().err()]);
    DashboardPage { surveys, insights }
}

pub async fn load_survey_submissions(
    client: &TallyClient,
    survey_id: EntityId,
    submissions: PageRequest,
) -> SurveySubmissionsPage {
    let (survey, submissions) = tokio::join!(
        client.get_survey(survey_id),
        client.list_submissions(Some(survey_id), submissions),
    );
    log_failures(
        "survey_submissions",
        [survey.as_ref().err(), submissions.as_ref().err()],
    );
    SurveySubmissionsPage {
        survey,
        submissions,
    }
}

pub async fn load_survey_insights(
    client: &TallyClient,
    survey_id: EntityId,
    insights: PageRequest,
) -> SurveyInsightsPage {
    let (insights, survey) = tokio::join!(
        client.list_insights(Some(survey_id), insights),
        client.get_survey(survey_id),
    );
    log_failures("survey_insights", [survey.as_ref().err(), insights.as_ref().err()]);
    SurveyInsightsPage { survey, insights }
}

fn log_failures<const N: usize>(page: &str, errors: [Option<&ClientError>; N]) {
    for err in errors.into_iter().flatten() {
        tracing::warn!(page, error = %err, "Page section failed to load");
    }
}
