// src/cloud/bigquery.rs

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::error::Error as BqError;
use google_cloud_bigquery::http::job::get_query_results::GetQueryResultsRequest;
use google_cloud_bigquery::http::job::query::QueryRequest;

use super::{ExternalTable, Provision, ServiceAccountKey, Warehouse, LOCATION};
use crate::schema::{FieldDescriptor, FieldMode};

fn status(err: &BqError) -> Option<u16> {
    match err {
        BqError::Response(resp) => Some(resp.code),
        _ => None,
    }
}

/// Polls of an unfinished DDL job before giving up.
const MAX_POLLS: u32 = 60;
const POLL_DELAY: Duration = Duration::from_secs(2);

/// State of a DDL query job as reported by one BigQuery call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobPoll {
    Running,
    Done,
    Conflict,
}

fn job_state<T>(res: Result<T, BqError>, complete: impl Fn(&T) -> bool) -> Result<JobPoll, BqError> {
    match res {
        Ok(r) if complete(&r) => Ok(JobPoll::Done),
        Ok(_) => Ok(JobPoll::Running),
        Err(e) if status(&e) == Some(409) => Ok(JobPoll::Conflict),
        Err(e) => Err(e),
    }
}

/// Call `poll` every `delay` until the job stops running.
async fn wait_for_job<F, Fut>(delay: Duration, mut poll: F) -> Result<Provision>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobPoll>>,
{
    for _ in 0..MAX_POLLS {
        sleep(delay).await;
        match poll().await? {
            JobPoll::Done => return Ok(Provision::Created),
            JobPoll::Conflict => return Ok(Provision::AlreadyExists),
            JobPoll::Running => {}
        }
    }
    bail!("job still running after {} polls", MAX_POLLS)
}

fn quote_ident(parts: &[&str]) -> String {
    format!("`{}`", parts.join(".").replace('`', ""))
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn column_ddl(field: &FieldDescriptor) -> String {
    let ty = field.ty.sql_name();
    let name = quote_ident(&[&field.name]);
    match field.mode {
        FieldMode::Nullable => format!("{} {}", name, ty),
        FieldMode::Required => format!("{} {} NOT NULL", name, ty),
        FieldMode::Repeated => format!("{} ARRAY<{}>", name, ty),
    }
}

pub fn create_dataset_ddl(project: &str, dataset: &str) -> String {
    format!(
        "CREATE SCHEMA {} OPTIONS(location = {})",
        quote_ident(&[project, dataset]),
        quote_literal(LOCATION)
    )
}

/// `CREATE EXTERNAL TABLE` over newline-delimited JSON. Without a schema the
/// column list is left out and BigQuery detects it.
pub fn create_table_ddl(project: &str, table: &ExternalTable) -> String {
    let name = quote_ident(&[project, &table.dataset, &table.table]);
    let columns = match &table.schema {
        Some(fields) => {
            let cols: Vec<String> = fields.iter().map(column_ddl).collect();
            format!(" (\n  {}\n)", cols.join(",\n  "))
        }
        None => String::new(),
    };
    format!(
        "CREATE EXTERNAL TABLE {}{}\nOPTIONS (\n  format = 'NEWLINE_DELIMITED_JSON',\n  uris = [{}]\n)",
        name,
        columns,
        quote_literal(&table.source_uri)
    )
}

/// BigQuery datasets and external tables, created through DDL queries.
pub struct BigQueryWarehouse {
    client: Client,
    project: String,
}

impl BigQueryWarehouse {
    pub async fn connect(key: &ServiceAccountKey, project: &str) -> Result<Self> {
        let (cfg, _key_project) = ClientConfig::new_with_credentials(key.bigquery_credentials()?)
            .await
            .context("authenticating BigQuery client")?;
        let client = Client::new(cfg)
            .await
            .context("building BigQuery client")?;
        Ok(Self {
            client,
            project: project.to_string(),
        })
    }

    /// Run a DDL statement and wait for its job to finish. A 409 at any point
    /// means the object is already there.
    async fn run_ddl(&self, ddl: String) -> Result<Provision> {
        debug!(%ddl, "running DDL");
        let req = QueryRequest {
            query: ddl,
            use_legacy_sql: false,
            location: LOCATION.to_string(),
            ..Default::default()
        };
        let jobs = self.client.job();
        let job = match jobs.query(&self.project, &req).await {
            Ok(r) if r.job_complete => return Ok(Provision::Created),
            Ok(r) => r.job_reference,
            Err(e) if status(&e) == Some(409) => return Ok(Provision::AlreadyExists),
            Err(e) => return Err(e).context("submitting query job"),
        };

        let project = self.project.as_str();
        let job_id = job.job_id.as_str();
        let results = &GetQueryResultsRequest {
            location: job.location.clone(),
            ..Default::default()
        };
        wait_for_job(POLL_DELAY, move || async move {
            debug!(job_id, "waiting for DDL job");
            let res = jobs.get_query_results(project, job_id, results).await;
            job_state(res, |r| r.job_complete).with_context(|| format!("polling job {}", job_id))
        })
        .await
    }

    async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool> {
        match self.client.table().get(&self.project, dataset, table).await {
            Ok(_) => Ok(true),
            Err(e) if status(&e) == Some(404) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("looking up table {}.{}", dataset, table)),
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    fn project(&self) -> &str {
        &self.project
    }

    async fn dataset_exists(&self, dataset: &str) -> Result<bool> {
        match self.client.dataset().get(&self.project, dataset).await {
            Ok(_) => Ok(true),
            Err(e) if status(&e) == Some(404) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("looking up dataset {}", dataset)),
        }
    }

    #[instrument(level = "info", skip(self), fields(project = %self.project))]
    async fn create_dataset(&self, dataset: &str) -> Result<Provision> {
        let outcome = self
            .run_ddl(create_dataset_ddl(&self.project, dataset))
            .await
            .with_context(|| format!("creating dataset {}", dataset))?;
        if outcome.is_created() {
            info!(dataset, location = LOCATION, "dataset created");
        }
        Ok(outcome)
    }

    async fn create_external_table(&self, table: &ExternalTable) -> Result<Provision> {
        if self.table_exists(&table.dataset, &table.table).await? {
            return Ok(Provision::AlreadyExists);
        }
        self.run_ddl(create_table_ddl(&self.project, table))
            .await
            .with_context(|| format!("creating table {}.{}", table.dataset, table.table))
    }
}
