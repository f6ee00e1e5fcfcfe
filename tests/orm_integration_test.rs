//! Functional tests for the SQLite operator stack: insert/query/refresh/
//! update/delete against a real in-memory database.

use catena::{
    and, col, eq, join, left_join, model, object_info, Executor, Model, OrmError, Query,
    SqliteDialect, SqliteExecutor, SqliteOperator, Value,
};
use chrono::NaiveDate;

model! {
    pub struct Empty("empty") {
        id: Int [primary],
        name: Bytes,
        uni: Text,
        date: Date,
        dtime: DateTime,
        mybool: Bool,
    }
}

model! {
    pub struct Defaults("with_defaults") {
        id: Int [primary],
        name: Bytes,
        uni: Text,
        date: Date,
        dtime: DateTime,
        mybool: Bool,
    }
}

model! {
    pub struct Parent("parent") {
        id: Int [primary],
        name: Text,
    }
}

model! {
    pub struct Child("child") {
        id: Int [primary],
        name: Text,
        parent_id: Int,
    }
}

model! {
    pub struct FavoriteBook("favorite_book") {
        child_id: Int [primary],
        book_id: Int [primary],
        stars: Int,
    }
}

model! {
    pub struct Book("book") {
        id: Int [primary],
        name: Text,
    }
}

async fn setup() -> (SqliteOperator, SqliteExecutor) {
    let mut cursor = SqliteExecutor::open_in_memory().unwrap();
    create_tables(&mut cursor).await;
    (SqliteOperator::new(SqliteDialect::new()), cursor)
}

async fn create_tables(cursor: &mut SqliteExecutor) {
    let ddl = [
        "CREATE TABLE empty (
            id INTEGER PRIMARY KEY,
            name BLOB,
            uni TEXT,
            date DATE,
            dtime TIMESTAMP,
            mybool BOOLEAN
        )",
        "CREATE TABLE with_defaults (
            id INTEGER PRIMARY KEY,
            name BLOB DEFAULT 'hey',
            uni TEXT DEFAULT 'ho',
            date DATE DEFAULT '2001-01-01',
            dtime TIMESTAMP DEFAULT '2001-01-01 12:22:32',
            mybool BOOLEAN DEFAULT 1
        )",
        "CREATE TABLE parent (
            id INTEGER PRIMARY KEY,
            name TEXT
        )",
        "CREATE TABLE child (
            id INTEGER PRIMARY KEY,
            name TEXT,
            parent_id INTEGER
        )",
        "CREATE TABLE favorite_book (
            child_id INTEGER,
            book_id INTEGER,
            stars INTEGER,
            PRIMARY KEY (child_id, book_id)
        )",
        "CREATE TABLE book (
            id INTEGER PRIMARY KEY,
            name TEXT
        )",
    ];
    for sql in ddl {
        cursor.execute(sql, &[]).await.unwrap();
    }
}

fn blob(bytes: &[u8]) -> Value {
    Value::Blob(bytes.to_vec())
}

#[tokio::test]
async fn insert_no_values() {
    let (oper, mut cursor) = setup().await;
    let mut empty = Empty::new();
    oper.insert(&mut cursor, &mut empty).await.unwrap();

    assert_ne!(empty.get(Empty::id()).unwrap(), Value::Null);
    assert_eq!(empty.get(Empty::name()).unwrap(), Value::Null);
    assert_eq!(empty.get(Empty::uni()).unwrap(), Value::Null);
    assert_eq!(empty.get(Empty::date()).unwrap(), Value::Null);
    assert_eq!(empty.get(Empty::dtime()).unwrap(), Value::Null);
    assert_eq!(empty.get(Empty::mybool()).unwrap(), Value::Null);
    // the fetched row synced everything
    assert!(object_info(&mut empty).changed().unwrap().is_empty());
}

#[tokio::test]
async fn insert_values() {
    let (oper, mut cursor) = setup().await;
    let mut empty = Empty::new();
    let day = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    let moment = day.and_hms_opt(12, 23, 22).unwrap();
    empty.set(Empty::name(), blob(b"foo")).unwrap();
    empty.set(Empty::uni(), "something").unwrap();
    empty.set(Empty::date(), day).unwrap();
    empty.set(Empty::dtime(), moment).unwrap();
    empty.set(Empty::mybool(), true).unwrap();

    oper.insert(&mut cursor, &mut empty).await.unwrap();

    assert_ne!(empty.get(Empty::id()).unwrap(), Value::Null);
    assert_eq!(empty.get(Empty::name()).unwrap(), blob(b"foo"));
    assert_eq!(empty.get(Empty::uni()).unwrap(), Value::from("something"));
    assert_eq!(empty.get(Empty::date()).unwrap(), Value::Date(day));
    assert_eq!(empty.get(Empty::dtime()).unwrap(), Value::DateTime(moment));
    assert_eq!(empty.get(Empty::mybool()).unwrap(), Value::Boolean(true));
}

#[tokio::test]
async fn insert_picks_up_database_defaults() {
    let (oper, mut cursor) = setup().await;
    let mut defs = Defaults::new();
    oper.insert(&mut cursor, &mut defs).await.unwrap();

    assert_ne!(defs.get(Defaults::id()).unwrap(), Value::Null);
    assert_eq!(defs.get(Defaults::name()).unwrap(), blob(b"hey"));
    assert_eq!(defs.get(Defaults::uni()).unwrap(), Value::from("ho"));
    assert_eq!(
        defs.get(Defaults::date()).unwrap(),
        Value::Date(NaiveDate::from_ymd_opt(2001, 1, 1).unwrap())
    );
    assert_eq!(
        defs.get(Defaults::dtime()).unwrap(),
        Value::DateTime(
            NaiveDate::from_ymd_opt(2001, 1, 1)
                .unwrap()
                .and_hms_opt(12, 22, 32)
                .unwrap()
        )
    );
    assert_eq!(defs.get(Defaults::mybool()).unwrap(), Value::Boolean(true));
}

#[tokio::test]
async fn inserted_values_override_database_defaults() {
    let (oper, mut cursor) = setup().await;
    let mut defs = Defaults::new();
    defs.set(Defaults::name(), blob(b"something")).unwrap();
    defs.set(Defaults::mybool(), false).unwrap();
    oper.insert(&mut cursor, &mut defs).await.unwrap();

    assert_eq!(defs.get(Defaults::name()).unwrap(), blob(b"something"));
    assert_eq!(defs.get(Defaults::mybool()).unwrap(), Value::Boolean(false));
    // untouched columns still get their database defaults
    assert_eq!(defs.get(Defaults::uni()).unwrap(), Value::from("ho"));
}

#[tokio::test]
async fn insert_binary_data() {
    let (oper, mut cursor) = setup().await;
    let mut empty = Empty::new();
    empty.set(Empty::name(), blob(b"\x00\x01\x02hey\x00")).unwrap();
    oper.insert(&mut cursor, &mut empty).await.unwrap();
    assert_eq!(
        empty.get(Empty::name()).unwrap(),
        blob(b"\x00\x01\x02hey\x00")
    );
}

#[tokio::test]
async fn query_basic() {
    let (oper, mut cursor) = setup().await;
    for name in [b"1", b"2"] {
        let mut empty = Empty::new();
        empty.set(Empty::name(), blob(name)).unwrap();
        oper.insert(&mut cursor, &mut empty).await.unwrap();
    }

    let mut items = oper
        .query(&mut cursor, &Query::<Empty>::new())
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    items.sort_by_key(|item| {
        item.store()
            .value("name")
            .and_then(|v| v.as_blob().map(|b| b.to_vec()))
    });
    assert_eq!(items[0].get(Empty::name()).unwrap(), blob(b"1"));
    assert_eq!(items[1].get(Empty::name()).unwrap(), blob(b"2"));
}

#[tokio::test]
async fn query_eq_on_id() {
    let (oper, mut cursor) = setup().await;
    let mut e1 = Empty::new();
    e1.set(Empty::name(), blob(b"1")).unwrap();
    oper.insert(&mut cursor, &mut e1).await.unwrap();
    let mut e2 = Empty::new();
    e2.set(Empty::name(), blob(b"2")).unwrap();
    oper.insert(&mut cursor, &mut e2).await.unwrap();

    let id = e1.get(Empty::id()).unwrap();
    let query = Query::<Empty>::filter(eq(col(Empty::id()), catena::val(id)));
    let mut items = oper.query(&mut cursor, &query).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get(Empty::name()).unwrap(), blob(b"1"));
}

#[tokio::test]
async fn query_eq_on_bytes() {
    let (oper, mut cursor) = setup().await;
    let mut e1 = Empty::new();
    e1.set(Empty::name(), blob(b"1")).unwrap();
    oper.insert(&mut cursor, &mut e1).await.unwrap();

    let query = Query::<Empty>::filter(eq(col(Empty::name()), b"1".to_vec()));
    let items = oper.query(&mut cursor, &query).await.unwrap();
    assert_eq!(items.len(), 1);
}

async fn seed_parents_and_children(oper: &SqliteOperator, cursor: &mut SqliteExecutor) {
    let mut p1 = Parent::new();
    p1.set(Parent::id(), 1i64).unwrap();
    let mut p2 = Parent::new();
    p2.set(Parent::id(), 2i64).unwrap();
    let mut c1 = Child::new();
    c1.set(Child::name(), "child1").unwrap();
    c1.set(Child::parent_id(), 1i64).unwrap();
    let mut c2 = Child::new();
    c2.set(Child::name(), "child2").unwrap();
    c2.set(Child::parent_id(), 2i64).unwrap();

    oper.insert(cursor, &mut p1).await.unwrap();
    oper.insert(cursor, &mut p2).await.unwrap();
    oper.insert(cursor, &mut c1).await.unwrap();
    oper.insert(cursor, &mut c2).await.unwrap();
}

#[tokio::test]
async fn query_implicit_join() {
    let (oper, mut cursor) = setup().await;
    seed_parents_and_children(&oper, &mut cursor).await;

    let query = Query::<Child>::filter(and([
        eq(col(Child::parent_id()), col(Parent::id())),
        eq(col(Parent::id()), 1i64),
    ]));
    let mut items = oper.query(&mut cursor, &query).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get(Child::name()).unwrap(), Value::from("child1"));
}

#[tokio::test]
async fn query_multi_class() {
    let (oper, mut cursor) = setup().await;
    seed_parents_and_children(&oper, &mut cursor).await;

    let query = Query::<(Child, Parent)>::filter(and([
        eq(col(Child::parent_id()), col(Parent::id())),
        eq(col(Parent::id()), 2i64),
    ]));
    let mut items = oper.query(&mut cursor, &query).await.unwrap();
    assert_eq!(items.len(), 1);
    let (child, parent) = &mut items[0];
    assert_eq!(child.get(Child::name()).unwrap(), Value::from("child2"));
    assert_eq!(parent.get(Parent::id()).unwrap(), Value::Integer(2));
}

#[tokio::test]
async fn query_incremental_find() {
    let (oper, mut cursor) = setup().await;

    // distractions we must not pick up
    let mut decoy_parent = Parent::new();
    oper.insert(&mut cursor, &mut decoy_parent).await.unwrap();
    let mut decoy_child = Child::new();
    decoy_child.set(Child::name(), "nope").unwrap();
    decoy_child
        .set(Child::parent_id(), decoy_parent.get(Parent::id()).unwrap())
        .unwrap();
    oper.insert(&mut cursor, &mut decoy_child).await.unwrap();
    let mut decoy_book = Book::new();
    decoy_book
        .set(Book::name(), "Gone in Sixty Seconds")
        .unwrap();
    oper.insert(&mut cursor, &mut decoy_book).await.unwrap();
    let mut decoy_fav = FavoriteBook::new();
    decoy_fav
        .set(
            FavoriteBook::child_id(),
            decoy_child.get(Child::id()).unwrap(),
        )
        .unwrap();
    decoy_fav
        .set(FavoriteBook::book_id(), decoy_book.get(Book::id()).unwrap())
        .unwrap();
    oper.insert(&mut cursor, &mut decoy_fav).await.unwrap();

    // the data we are looking for
    let mut parent = Parent::new();
    oper.insert(&mut cursor, &mut parent).await.unwrap();
    let parent_id = parent.get(Parent::id()).unwrap();
    let mut child = Child::new();
    child.set(Child::name(), "child").unwrap();
    child.set(Child::parent_id(), parent_id.clone()).unwrap();
    oper.insert(&mut cursor, &mut child).await.unwrap();
    let mut book = Book::new();
    book.set(Book::name(), "Around the World in 80 Days").unwrap();
    oper.insert(&mut cursor, &mut book).await.unwrap();
    let mut fav = FavoriteBook::new();
    fav.set(FavoriteBook::child_id(), child.get(Child::id()).unwrap())
        .unwrap();
    fav.set(FavoriteBook::book_id(), book.get(Book::id()).unwrap())
        .unwrap();
    oper.insert(&mut cursor, &mut fav).await.unwrap();

    // simple
    let query = Query::<Parent>::filter(eq(col(Parent::id()), catena::val(parent_id)));
    let rows = oper.query(&mut cursor, &query).await.unwrap();
    assert_eq!(rows.len(), 1);

    // one join
    let query2: Query<Child> = query.find(eq(col(Parent::id()), col(Child::parent_id())));
    let mut rows = oper.query(&mut cursor, &query2).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(Child::name()).unwrap(), Value::from("child"));

    // two joins
    let query3: Query<FavoriteBook> = query2
        .clone()
        .find(eq(col(Child::id()), col(FavoriteBook::child_id())));
    let mut rows = oper.query(&mut cursor, &query3).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get(FavoriteBook::child_id()).unwrap(),
        child.get(Child::id()).unwrap()
    );

    // three joins
    let query4: Query<Book> = query3.find(eq(col(Book::id()), col(FavoriteBook::book_id())));
    let mut rows = oper.query(&mut cursor, &query4).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get(Book::name()).unwrap(),
        Value::from("Around the World in 80 Days")
    );

    // parent straight to book in one step
    let query5: Query<Book> = Query::<Parent>::new().find(and([
        eq(col(Book::id()), col(FavoriteBook::book_id())),
        eq(col(FavoriteBook::child_id()), col(Child::id())),
        eq(col(Child::parent_id()), col(Parent::id())),
        eq(
            col(Parent::id()),
            catena::val(parent.get(Parent::id()).unwrap()),
        ),
    ]));
    let mut rows = oper.query(&mut cursor, &query5).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get(Book::name()).unwrap(),
        Value::from("Around the World in 80 Days")
    );
}

#[tokio::test]
async fn query_explicit_inner_join() {
    let (oper, mut cursor) = setup().await;
    seed_parents_and_children(&oper, &mut cursor).await;

    let query = Query::<(Parent, Child)>::new()
        .with_join(join::<Child>(eq(col(Child::parent_id()), col(Parent::id()))));
    let items = oper.query(&mut cursor, &query).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn query_left_join_yields_null_children() {
    let (oper, mut cursor) = setup().await;

    let mut with_child = Parent::new();
    with_child.set(Parent::name(), "haunted").unwrap();
    oper.insert(&mut cursor, &mut with_child).await.unwrap();
    let mut child = Child::new();
    child.set(Child::name(), "ghost").unwrap();
    child
        .set(Child::parent_id(), with_child.get(Parent::id()).unwrap())
        .unwrap();
    oper.insert(&mut cursor, &mut child).await.unwrap();

    let mut childless = Parent::new();
    childless.set(Parent::name(), "empty nest").unwrap();
    oper.insert(&mut cursor, &mut childless).await.unwrap();

    let query = Query::<(Parent, Child)>::new().with_join(left_join::<Child>(eq(
        col(Child::parent_id()),
        col(Parent::id()),
    )));
    let mut items = oper.query(&mut cursor, &query).await.unwrap();
    assert_eq!(items.len(), 2);
    items.sort_by_key(|(parent, _)| {
        parent
            .store()
            .value("name")
            .and_then(|v| v.as_text().map(|s| s.to_string()))
    });

    let (_, nobody) = &mut items[0];
    assert_eq!(nobody.get(Child::id()).unwrap(), Value::Null);
    assert_eq!(nobody.get(Child::name()).unwrap(), Value::Null);
    let (_, ghost) = &mut items[1];
    assert_eq!(ghost.get(Child::name()).unwrap(), Value::from("ghost"));
}

#[tokio::test]
async fn refresh_by_primary_key() {
    let (oper, mut cursor) = setup().await;
    let mut obj = Empty::new();
    obj.set(Empty::name(), blob(b"hello")).unwrap();
    oper.insert(&mut cursor, &mut obj).await.unwrap();

    let mut fresh = Empty::new();
    fresh
        .set(Empty::id(), obj.get(Empty::id()).unwrap())
        .unwrap();
    oper.refresh(&mut cursor, &mut fresh).await.unwrap();
    assert_eq!(fresh.get(Empty::name()).unwrap(), blob(b"hello"));
}

#[tokio::test]
async fn refresh_by_compound_primary_key() {
    let (oper, mut cursor) = setup().await;
    let mut fav = FavoriteBook::new();
    fav.set(FavoriteBook::child_id(), 3i64).unwrap();
    fav.set(FavoriteBook::book_id(), 12i64).unwrap();
    fav.set(FavoriteBook::stars(), 800i64).unwrap();
    oper.insert(&mut cursor, &mut fav).await.unwrap();

    let mut fresh = FavoriteBook::new();
    fresh.set(FavoriteBook::child_id(), 3i64).unwrap();
    fresh.set(FavoriteBook::book_id(), 12i64).unwrap();
    oper.refresh(&mut cursor, &mut fresh).await.unwrap();
    assert_eq!(
        fresh.get(FavoriteBook::stars()).unwrap(),
        Value::Integer(800)
    );
}

#[tokio::test]
async fn update_writes_changed_columns() {
    let (oper, mut cursor) = setup().await;
    let mut obj = Empty::new();
    oper.insert(&mut cursor, &mut obj).await.unwrap();

    let day = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    obj.set(Empty::name(), blob(b"new name")).unwrap();
    obj.set(Empty::uni(), "unicycle").unwrap();
    obj.set(Empty::date(), day).unwrap();
    oper.update(&mut cursor, &mut obj).await.unwrap();

    let mut check = Empty::new();
    check
        .set(Empty::id(), obj.get(Empty::id()).unwrap())
        .unwrap();
    oper.refresh(&mut cursor, &mut check).await.unwrap();
    assert_eq!(check.get(Empty::name()).unwrap(), blob(b"new name"));
    assert_eq!(check.get(Empty::uni()).unwrap(), Value::from("unicycle"));
    assert_eq!(check.get(Empty::date()).unwrap(), Value::Date(day));
}

#[tokio::test]
async fn delete_removes_row() {
    let (oper, mut cursor) = setup().await;
    let mut obj = Empty::new();
    oper.insert(&mut cursor, &mut obj).await.unwrap();

    oper.delete(&mut cursor, &mut obj).await.unwrap();

    let mut gone = Empty::new();
    gone.set(Empty::id(), obj.get(Empty::id()).unwrap()).unwrap();
    let err = oper.refresh(&mut cursor, &mut gone).await.unwrap_err();
    assert!(matches!(err, OrmError::NotFound { .. }));
}

#[tokio::test]
async fn file_backed_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catena_test.db");
    let oper = SqliteOperator::new(SqliteDialect::new());

    {
        let mut cursor = SqliteExecutor::open(&path).unwrap();
        create_tables(&mut cursor).await;
        let mut obj = Empty::new();
        obj.set(Empty::uni(), "durable").unwrap();
        oper.insert(&mut cursor, &mut obj).await.unwrap();
    }

    let mut cursor = SqliteExecutor::open(&path).unwrap();
    let mut items = oper
        .query(&mut cursor, &Query::<Empty>::new())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get(Empty::uni()).unwrap(), Value::from("durable"));
}
