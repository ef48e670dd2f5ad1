//! End-to-end dispatch through a route table built with every registration style.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use vestibule_core::response::{APPLICATION_JSON, TEXT_HTML, TEXT_PLAIN};
use vestibule_core::{
    Bindable, BoundArguments, Controller, Dispatcher, Handler, Method, MethodConstraint,
    ModelView, Outcome, ParamSpec, Request, Response, RouteDescriptor, RouteTable, Server,
};

#[derive(Debug, Default, Deserialize, Bindable)]
#[serde(default)]
struct Notes {
    moyenne: f64,
    mention: String,
}

#[derive(Debug, Default, Deserialize, Bindable)]
#[serde(default)]
struct Student {
    name: String,
    grades: Vec<i64>,
    notes: Notes,
    #[serde(rename = "isActive")]
    active: bool,
}

struct StudentController;

impl Controller for StudentController {
    fn construct() -> Option<Self> {
        Some(Self)
    }
}

struct Broken;

impl Controller for Broken {
    fn construct() -> Option<Self> {
        None
    }
}

fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn table() -> RouteTable {
    RouteTable::builder()
        .get(
            "/students/new",
            Handler::new("fresh", |_: &mut StudentController, _: &BoundArguments| {
                Ok("literal".into())
            }),
        )
        .get(
            "/students/{id:[0-9]+}",
            Handler::new("show", |_: &mut StudentController, args: &BoundArguments| {
                Ok(format!("student {}", args.int("id")).into())
            })
            .param::<i64>("id"),
        )
        .get(
            "/{section}",
            Handler::new("section", |_: &mut StudentController, args: &BoundArguments| {
                Ok(args.str("section").unwrap_or_default().to_string().into())
            })
            .param::<String>("section"),
        )
        .get(
            "/x",
            Handler::new("x", |_: &mut StudentController, _: &BoundArguments| Ok("literal x".into())),
        )
        .post(
            "/students",
            Handler::new("create", |_: &mut StudentController, args: &BoundArguments| {
                let student: Student = args.get("student").unwrap_or_default();
                Ok(data(json!({
                    "name": student.name,
                    "grades": student.grades,
                    "moyenne": student.notes.moyenne,
                    "mention": student.notes.mention,
                    "active": student.active,
                }))
                .into())
            })
            .param::<Student>("student")
            .json(),
        )
        .path(
            "/report",
            Handler::new("report", |_: &mut StudentController, args: &BoundArguments| {
                let mut out = Map::new();
                out.insert("page".into(), json!(args.int("page")));
                out.insert("verbose".into(), json!(args.boolean("verbose")));
                Ok(out.into())
            })
            .with_params(vec![ParamSpec::of::<i64>("page"), ParamSpec::of::<bool>("verbose")])
            .json(),
        )
        .path(
            "/echo",
            Handler::new("echo", |_: &mut StudentController, _: &BoundArguments| Ok(Outcome::Empty)).json(),
        )
        .convention(Handler::new("index", |_: &mut StudentController, _: &BoundArguments| {
            Ok(ModelView::new("student.html").with("title", "Students").into())
        }))
        .convention(Handler::new("list", |_: &mut StudentController, _: &BoundArguments| {
            Ok(Outcome::Empty)
        }))
        .path(
            "/broken",
            Handler::new("run", |_: &mut Broken, _: &BoundArguments| Ok(Outcome::Empty)),
        )
        .build()
}

fn dispatcher() -> Dispatcher {
    Dispatcher::new(table()).with_views(|view: &str, req: &Request| -> vestibule_core::Result<Response> {
        let title = req.attribute("title").and_then(Value::as_str).unwrap_or_default();
        Ok(Response::html(format!("<title>{title}</title><!-- {view} -->")))
    })
}

fn parsed(resp: &Response) -> Value {
    serde_json::from_str(&resp.body_text()).unwrap()
}

#[test]
fn test_literal_wins_over_templated() {
    let d = dispatcher();
    let resp = d.handle(&mut Request::new(Method::Get, "/x"));
    assert!(resp.body_text().ends_with("literal x\n"));
    let resp = d.handle(&mut Request::new(Method::Get, "/students/new"));
    assert!(resp.body_text().ends_with("literal\n"));
}

#[test]
fn test_method_specific_template_beats_agnostic_literal() {
    let d = dispatcher();
    let resp = d.handle(&mut Request::new(Method::Get, "/report"));
    assert_eq!(resp.content_type, TEXT_PLAIN);
    assert!(resp.body_text().ends_with("Handler: section\nreport\n"));

    let resp = d.handle(&mut Request::new(Method::Post, "/report"));
    assert_eq!(resp.content_type, APPLICATION_JSON);
}

#[test]
fn test_template_extracts_parameters() {
    let d = dispatcher();
    let resp = d.handle(&mut Request::new(Method::Get, "/students/42"));
    assert!(resp.body_text().ends_with("student 42\n"));

    let resp = d.handle(&mut Request::new(Method::Get, "/students/42/extra"));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.content_type, TEXT_HTML);
    assert!(resp.body_text().contains("Path: /students/42/extra"));
}

#[test]
fn test_nested_structure_binding() {
    let req = Request::new(Method::Post, "/students").with_body(
        "application/x-www-form-urlencoded",
        "student.name=Ana&student.grades[0]=18&student.grades[1]=15\
         &student.notes.moyenne=16.5&student.notes.mention=bien&student.isActive=true",
    );
    let resp = dispatcher().handle(&mut req.unwrap());
    assert_eq!(resp.content_type, APPLICATION_JSON);
    assert_eq!(
        parsed(&resp)["data"],
        json!({"name": "Ana", "grades": [18, 15], "moyenne": 16.5, "mention": "bien", "active": true})
    );
}

#[test]
fn test_json_body_binds_like_form() {
    let mut req = Request::new(Method::Post, "/students")
        .with_body("application/json", r#"{"student":{"name":"Ana","grades":[18,15]}}"#)
        .unwrap();
    let resp = dispatcher().handle(&mut req);
    let doc = parsed(&resp);
    assert_eq!(doc["data"]["name"], json!("Ana"));
    assert_eq!(doc["data"]["grades"], json!([18, 15]));
}

#[test]
fn test_missing_structure_binds_null() {
    let resp = dispatcher().handle(&mut Request::new(Method::Post, "/students?other=1"));
    assert_eq!(parsed(&resp)["data"]["name"], json!(""));
}

#[test]
fn test_missing_primitives_are_zero() {
    let resp = dispatcher().handle(&mut Request::new(Method::Post, "/report?page=abc"));
    assert_eq!(
        resp.body_text(),
        r#"{"status":"OK","code":200,"count":2,"data":{"page":0,"verbose":false}}"#
    );
}

#[test]
fn test_json_document_round_trip() {
    let resp = dispatcher().handle(&mut Request::new(Method::Post, "/report?page=3&verbose=true"));
    let doc = parsed(&resp);
    assert_eq!(doc["status"], json!("OK"));
    assert_eq!(doc["code"], json!(200));
    assert_eq!(doc["data"], json!({"page": 3, "verbose": true}));
}

#[test]
fn test_json_echo_of_parameters() {
    let resp = dispatcher().handle(&mut Request::new(Method::Post, "/echo?a.b[2]=v&c=1"));
    assert_eq!(
        resp.body_text(),
        r#"{"status":"OK","code":200,"count":2,"data":{"a":{"b":[null,null,"v"]},"c":"1"}}"#
    );
}

#[test]
fn test_convention_routes_and_view_forward() {
    let d = dispatcher();
    let resp = d.handle(&mut Request::new(Method::Post, "/student"));
    assert_eq!(resp.content_type, TEXT_HTML);
    assert_eq!(resp.body_text(), "<title>Students</title><!-- student.html -->");

    let resp = d.handle(&mut Request::new(Method::Post, "/Student/List/"));
    assert_eq!(resp.content_type, TEXT_PLAIN);
    assert_eq!(
        resp.body_text(),
        "Owning type: StudentController\nHandler: list\nnull result\n"
    );
}

#[test]
fn test_method_constraints() {
    let d = dispatcher();
    let resp = d.handle(&mut Request::new(Method::Delete, "/students/7"));
    assert!(resp.body_text().contains("Path: /students/7"));
    let resp = d.handle(&mut Request::new(Method::Delete, "/report"));
    assert_eq!(resp.content_type, APPLICATION_JSON);
}

#[test]
fn test_construction_failure_is_isolated() {
    let d = dispatcher();
    let resp = d.handle(&mut Request::new(Method::Post, "/broken"));
    assert_eq!(resp.status, 500);
    assert_eq!(resp.content_type, TEXT_PLAIN);
    assert!(resp.body_text().contains("Broken"));
    assert_eq!(d.handle(&mut Request::new(Method::Get, "/students/1")).status, 200);
}

#[test]
fn test_resolution_is_idempotent() {
    let table = table();
    let first = table.resolve("/students/9", Method::Get).map(|(r, p)| (r.to_string(), p));
    for _ in 0..3 {
        let again = table.resolve("/students/9", Method::Get).map(|(r, p)| (r.to_string(), p));
        assert_eq!(again, first);
    }
}

#[test]
fn test_invalid_method_string() {
    assert!("PATCH".parse::<MethodConstraint>().is_err());
    let desc = RouteDescriptor::new(
        "/all",
        "ALL".parse().unwrap(),
        Handler::new("all", |_: &mut StudentController, _: &BoundArguments| Ok(Outcome::Empty)),
        vestibule_core::Origin::ExplicitPath,
    );
    assert_eq!(desc.method, MethodConstraint::Any);
}

#[tokio::test]
async fn test_server_pipeline() {
    let server = Server::new(dispatcher());
    let resp = server
        .test_request(Request::new(Method::Get, "/students/5"))
        .await;
    assert_eq!(resp.status, 200);
    assert!(resp.body_text().ends_with("student 5\n"));
    assert!(resp.header("x-request-id").is_some());
}
