// ABOUTME: Project and team membership checks backed by the GitHub GraphQL API
// ABOUTME: Pages through classic project cards and team members, stopping at the first match

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use tracing::debug;

use super::error::{ActionError, Result};
use crate::source::GraphqlClient;

const TEAM_QUERY: &str = r#"query($org: String!, $team: String!, $cursor: String) {
  organization(login: $org) {
    team(slug: $team) {
      members(first: 100, after: $cursor) {
        nodes {
          login
        }
        pageInfo {
          endCursor
          hasNextPage
        }
      }
    }
  }
}"#;

/// Account or repository a classic project belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectOwner {
    Organization(String),
    User(String),
    Repository { owner: String, name: String },
}

impl ProjectOwner {
    /// Pick the first non-empty input, in org, user, repository order
    pub fn from_inputs(
        org: Option<&str>,
        user: Option<&str>,
        repository: Option<&str>,
    ) -> Result<Self> {
        let given = |value: Option<&str>| value.filter(|v| !v.is_empty()).map(str::to_string);
        if let Some(org) = given(org) {
            return Ok(Self::Organization(org));
        }
        if let Some(user) = given(user) {
            return Ok(Self::User(user));
        }
        let Some(repository) = given(repository) else {
            return Err(ActionError::InvalidInput(
                "Input required and not supplied: org, user, or repo".to_string(),
            ));
        };
        match repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::Repository {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(ActionError::InvalidInput(format!(
                "expected a repository as owner/name, not '{}'",
                repository
            ))),
        }
    }

    /// Response member the project hangs off
    fn field(&self) -> &'static str {
        match self {
            Self::Organization(_) => "organization",
            Self::User(_) => "user",
            Self::Repository { .. } => "repository",
        }
    }

    fn query(&self) -> String {
        let (parameters, selector) = match self {
            Self::Organization(_) => ("$login: String!", "organization(login: $login)"),
            Self::User(_) => ("$login: String!", "user(login: $login)"),
            Self::Repository { .. } => (
                "$owner: String!, $name: String!",
                "repository(owner: $owner, name: $name)",
            ),
        };
        format!(
            r#"query({parameters}, $project: Int!, $cursor: String) {{
  {selector} {{
    project(number: $project) {{
      columns(first: 100, after: $cursor) {{
        nodes {{
          cards(first: 100) {{
            edges {{
              node {{
                content {{
                  ... on Issue {{
                    databaseId
                    number
                    title
                  }}
                }}
              }}
            }}
          }}
        }}
        pageInfo {{
          endCursor
          hasNextPage
        }}
      }}
    }}
  }}
}}"#
        )
    }

    fn variables(&self, project: u64) -> JsonValue {
        match self {
            Self::Organization(login) | Self::User(login) => {
                json!({"login": login, "project": project})
            }
            Self::Repository { owner, name } => {
                json!({"owner": owner, "name": name, "project": project})
            }
        }
    }
}

impl fmt::Display for ProjectOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organization(login) => write!(f, "org {}", login),
            Self::User(login) => write!(f, "user {}", login),
            Self::Repository { owner, name } => write!(f, "repo {}/{}", owner, name),
        }
    }
}

/// An issue card on a classic project board
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectIssue {
    pub id: u64,
    pub number: u64,
    pub title: String,
}

/// A yes/no answer when an item was asked about, the full listing otherwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Membership<T> {
    Contains(bool),
    Listing(Vec<T>),
}

impl<T: Serialize> Membership<T> {
    /// Value of the `contains` step output
    pub fn to_output(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|source| ActionError::JsonError {
            origin: "contains output".to_string(),
            source,
        })
    }
}

impl Membership<ProjectIssue> {
    pub fn summary(&self, project: u64, issue: Option<u64>) -> String {
        let issue = issue.map_or_else(|| "null".to_string(), |id| id.to_string());
        match self {
            Self::Contains(true) => {
                format!("✅ issue (id: {}) exists in project (number: {})", issue, project)
            }
            Self::Contains(false) => format!(
                "❌ issue (id: {}) does not exist in project (number: {})",
                issue, project
            ),
            Self::Listing(issues) => {
                format!("#️⃣  {} issues in project (number: {})", issues.len(), project)
            }
        }
    }
}

impl Membership<String> {
    pub fn summary(&self, org: &str, team: &str, user: Option<&str>) -> String {
        let user = user.unwrap_or("null");
        match self {
            Self::Contains(found) => format!(
                "{} user (login: {}) {} a member of the team (org: {}, team: {})",
                if *found { "✅" } else { "❌" },
                user,
                if *found { "is" } else { "is not" },
                org,
                team
            ),
            Self::Listing(members) => format!(
                "#️⃣  {} members in the team (org: {}, team: {})",
                members.len(),
                org,
                team
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    end_cursor: Option<String>,
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
struct Connection<T> {
    #[serde(default)]
    nodes: Option<Vec<T>>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct Column {
    cards: Cards,
}

#[derive(Debug, Deserialize)]
struct Cards {
    #[serde(default)]
    edges: Vec<CardEdge>,
}

#[derive(Debug, Deserialize)]
struct CardEdge {
    node: Option<Card>,
}

#[derive(Debug, Deserialize)]
struct Card {
    content: Option<CardContent>,
}

/// Notes and pull requests select none of the `... on Issue` fields
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardContent {
    database_id: Option<u64>,
    number: Option<u64>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Member {
    login: String,
}

struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

impl<T> Connection<T> {
    fn into_page<U>(self, items: impl FnOnce(Vec<T>) -> Vec<U>) -> Option<Page<U>> {
        let nodes = self.nodes?;
        let PageInfo {
            end_cursor,
            has_next_page,
        } = self.page_info;
        Some(Page {
            items: items(nodes),
            next: end_cursor.filter(|_| has_next_page),
        })
    }
}

/// Deserialize the connection at `pointer`, or `None` when the response stops short of it
fn connection<T: DeserializeOwned>(
    data: &JsonValue,
    pointer: &str,
) -> Result<Option<Connection<T>>> {
    match data.pointer(pointer) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| ActionError::JsonError {
                origin: format!("GraphQL response at {}", pointer),
                source,
            }),
    }
}

fn issue_page(owner: &ProjectOwner, data: &JsonValue) -> Result<Option<Page<ProjectIssue>>> {
    let columns = connection::<Column>(data, &format!("/{}/project/columns", owner.field()))?;
    Ok(columns.and_then(|columns| {
        columns.into_page(|nodes| {
            nodes
                .into_iter()
                .flat_map(|column| column.cards.edges)
                .filter_map(|edge| {
                    let content = edge.node?.content?;
                    Some(ProjectIssue {
                        id: content.database_id?,
                        number: content.number?,
                        title: content.title.unwrap_or_default(),
                    })
                })
                .collect()
        })
    }))
}

fn member_page(data: &JsonValue) -> Result<Option<Page<String>>> {
    let members = connection::<Member>(data, "/organization/team/members")?;
    Ok(members.and_then(|members| {
        members.into_page(|nodes| nodes.into_iter().map(|member| member.login).collect())
    }))
}

/// Feed every item to `visit` until it returns true or the pages run out.
///
/// Returns whether `visit` stopped the iteration.
async fn paginate<T>(
    client: &dyn GraphqlClient,
    query: &str,
    mut variables: JsonValue,
    parse: impl Fn(&JsonValue) -> Result<Option<Page<T>>>,
    mut visit: impl FnMut(T) -> bool,
) -> Result<bool> {
    let mut cursor = JsonValue::Null;
    loop {
        variables["cursor"] = cursor;
        let data = client.graphql(query, variables.clone()).await?;
        let Some(page) = parse(&data)? else {
            return Ok(false);
        };
        debug!("Fetched a page of {} item(s)", page.items.len());
        for item in page.items {
            if visit(item) {
                return Ok(true);
            }
        }
        match page.next {
            Some(next) => cursor = JsonValue::String(next),
            None => return Ok(false),
        }
    }
}

/// Check whether `issue` (a database id) is on the project, or list every issue on it
pub async fn issue_in_project(
    client: &dyn GraphqlClient,
    owner: &ProjectOwner,
    project: u64,
    issue: Option<u64>,
) -> Result<Membership<ProjectIssue>> {
    debug!("Searching project {} of {}", project, owner);
    let query = owner.query();
    let variables = owner.variables(project);
    let parse = |data: &JsonValue| issue_page(owner, data);

    match issue {
        Some(id) => {
            let found = paginate(client, &query, variables, parse, |item| item.id == id).await?;
            Ok(Membership::Contains(found))
        }
        None => {
            let mut issues = Vec::new();
            paginate(client, &query, variables, parse, |item| {
                issues.push(item);
                false
            })
            .await?;
            Ok(Membership::Listing(issues))
        }
    }
}

/// Check whether `user` is a member of the team, or list every member login
pub async fn user_in_team(
    client: &dyn GraphqlClient,
    org: &str,
    team: &str,
    user: Option<&str>,
) -> Result<Membership<String>> {
    debug!("Searching team {} of org {}", team, org);
    let variables = json!({"org": org, "team": team});

    match user {
        Some(user) => {
            let found =
                paginate(client, TEAM_QUERY, variables, member_page, |login| login == user).await?;
            Ok(Membership::Contains(found))
        }
        None => {
            let mut members = Vec::new();
            paginate(client, TEAM_QUERY, variables, member_page, |login| {
                members.push(login);
                false
            })
            .await?;
            Ok(Membership::Listing(members))
        }
    }
}
