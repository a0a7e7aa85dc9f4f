//! Record set behaviour against the in-memory store
//!
//! Covers creation rules, multi-record writes, relational commands and
//! deletion constraints as seen through the public `DocSet` API.

mod common;

use bson::{doc, Bson};
use common::*;
use olaf::db::FindSpec;
use olaf::OlafError;

#[tokio::test]
async fn test_create_applies_defaults_and_conversions() {
    let env = root_env().await;
    let partners = env.model(PARTNER).unwrap();

    let created = partners
        .create(doc! { "name": "0123456789", "age": 32 })
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created.field("name").await.unwrap(), Bson::from("0123456789"));
    assert_eq!(created.field("age").await.unwrap(), Bson::Int64(32));
    assert_eq!(created.field("ref").await.unwrap(), Bson::from("Default"));
    assert!(created.field("create_date").await.unwrap().as_datetime().is_some());
    assert_eq!(
        created.field("create_uid").await.unwrap(),
        Bson::ObjectId(env.uid())
    );

    // The empty model set stays empty
    assert!(partners.is_empty());
}

#[tokio::test]
async fn test_required_and_max_length() {
    let env = root_env().await;
    let partners = env.model(PARTNER).unwrap();

    let missing = partners.create(doc! { "age": 32 }).await;
    assert!(matches!(missing, Err(OlafError::RequiredField { ref field, .. }) if field == "name"));

    let too_long = partners.create(doc! { "name": "0123456789A" }).await;
    assert!(matches!(too_long, Err(OlafError::Validation(_))));

    assert_eq!(partners.search_count(doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn test_integer_conversion() {
    let env = root_env().await;
    let partners = env.model(PARTNER).unwrap();

    let from_text = partners
        .create(doc! { "name": "a", "age": "32" })
        .await
        .unwrap();
    assert_eq!(from_text.field("age").await.unwrap(), Bson::Int64(32));

    let from_float = partners
        .create(doc! { "name": "b", "age": 31.4 })
        .await
        .unwrap();
    assert_eq!(from_float.field("age").await.unwrap(), Bson::Int64(31));

    let invalid = partners
        .create(doc! { "name": "c", "age": "Thirtytwo" })
        .await;
    assert!(matches!(invalid, Err(OlafError::Validation(_))));
}

#[tokio::test]
async fn test_write_on_many_records() {
    let env = root_env().await;
    let a = partner(&env, "trm_a").await;
    let b = partner(&env, "trm_b").await;

    let both = env
        .model(PARTNER)
        .unwrap()
        .search(doc! { "name": { "$in": ["trm_a", "trm_b"] } })
        .await
        .unwrap();
    assert_eq!(both.len(), 2);

    both.set("name", "z").await.unwrap();
    assert_eq!(a.field("name").await.unwrap(), Bson::from("z"));
    assert_eq!(b.field("name").await.unwrap(), Bson::from("z"));

    assert!(matches!(
        both.field("name").await,
        Err(OlafError::SingletonExpected(2))
    ));
}

#[tokio::test]
async fn test_magic_fields_are_read_only() {
    let env = root_env().await;
    let a = partner(&env, "a").await;
    let result = a.write(doc! { "create_uid": bson::oid::ObjectId::new() }).await;
    assert!(matches!(result, Err(OlafError::Validation(_))));
}

#[tokio::test]
async fn test_set_equality_ignores_order() {
    let env = root_env().await;
    let a = partner(&env, "a").await;
    let b = partner(&env, "b").await;
    let partners = env.model(PARTNER).unwrap();

    let forward = partners.browse(vec![a.id().unwrap(), b.id().unwrap()]).await.unwrap();
    let backward = partners.browse(vec![b.id().unwrap(), a.id().unwrap()]).await.unwrap();
    assert_eq!(forward, backward);
    assert_ne!(forward, a);

    // Duplicated ids collapse
    let twice = partners.browse(vec![a.id().unwrap(), a.id().unwrap()]).await.unwrap();
    assert_eq!(twice.len(), 1);
}

#[tokio::test]
async fn test_search_sort_and_limit() {
    let env = root_env().await;
    for name in ["c", "a", "b"] {
        partner(&env, name).await;
    }
    let partners = env.model(PARTNER).unwrap();
    let found = partners
        .search_with(
            doc! {},
            FindSpec::new().with_sort(doc! { "name": 1 }).with_limit(2),
        )
        .await
        .unwrap();
    let names = found.read(&["name"]).await.unwrap();
    let names: Vec<&str> = names.iter().map(|d| d.get_str("name").unwrap()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn test_many2one_read_and_related() {
    let env = root_env().await;
    let category = env
        .model(CATEGORY)
        .unwrap()
        .create(doc! { "name": "Retail" })
        .await
        .unwrap();
    let p = env
        .model(PARTNER)
        .unwrap()
        .create(doc! { "name": "shop", "category_id": category.id().unwrap().to_hex() })
        .await
        .unwrap();

    assert_eq!(p.related("category_id").await.unwrap(), category);

    let records = p.read(&["name", "category_id"]).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].get_array("category_id").unwrap(),
        &vec![Bson::ObjectId(category.id().unwrap()), Bson::from("Retail")]
    );
    assert!(!records[0].contains_key("age"));
}

#[tokio::test]
async fn test_unique_field() {
    let env = root_env().await;
    let categories = env.model(CATEGORY).unwrap();
    categories.create(doc! { "name": "Retail" }).await.unwrap();
    let duplicate = categories.create(doc! { "name": "Retail" }).await;
    assert!(matches!(duplicate, Err(OlafError::Validation(_))));

    // Several records without a value do not collide
    categories.create(doc! {}).await.unwrap();
    categories.create(doc! {}).await.unwrap();
    assert_eq!(categories.search_count(doc! {}).await.unwrap(), 3);
}

#[tokio::test]
async fn test_one2many_commands() {
    let env = root_env().await;
    let p = env
        .model(PARTNER)
        .unwrap()
        .create(doc! {
            "name": "owner",
            "address_ids": [
                ["create", { "street": "Main St" }],
                ["create", { "street": "High St" }],
            ],
        })
        .await
        .unwrap();

    let addresses = p.related("address_ids").await.unwrap();
    assert_eq!(addresses.len(), 2);
    let first = addresses.ids()[0];
    let second = addresses.ids()[1];

    // Remove keeps the address but drops the link
    p.write(doc! { "address_ids": ["remove", first] }).await.unwrap();
    assert_eq!(p.related("address_ids").await.unwrap().ids(), &[second]);
    let orphan = env.model(ADDRESS).unwrap().browse(first).await.unwrap();
    assert_eq!(orphan.field("partner_id").await.unwrap(), Bson::Null);

    // Add links it again, write updates through the relation
    p.write(doc! {
        "address_ids": [["add", first], ["write", first, { "street": "Low St" }]],
    })
    .await
    .unwrap();
    assert_eq!(p.related("address_ids").await.unwrap().len(), 2);
    assert_eq!(orphan.field("street").await.unwrap(), Bson::from("Low St"));

    // Purge deletes the related record
    p.write(doc! { "address_ids": ["purge", second] }).await.unwrap();
    assert_eq!(env.model(ADDRESS).unwrap().search_count(doc! {}).await.unwrap(), 1);

    p.write(doc! { "address_ids": "clear" }).await.unwrap();
    assert!(p.related("address_ids").await.unwrap().is_empty());

    p.write(doc! { "address_ids": ["replace", [first]] }).await.unwrap();
    assert_eq!(p.related("address_ids").await.unwrap().ids(), &[first]);
}

#[tokio::test]
async fn test_many2many_commands() {
    let env = root_env().await;
    let tags = env.model(TAG).unwrap();
    let red = tags.create(doc! { "name": "red" }).await.unwrap();
    let blue = tags.create(doc! { "name": "blue" }).await.unwrap();
    let (red_id, blue_id) = (red.id().unwrap(), blue.id().unwrap());

    let p = env
        .model(PARTNER)
        .unwrap()
        .create(doc! { "name": "tagged", "tag_ids": [["add", red_id], ["add", red_id]] })
        .await
        .unwrap();
    assert_eq!(p.related("tag_ids").await.unwrap().ids(), &[red_id]);

    // The relation is visible from the other side
    assert_eq!(red.related("partner_ids").await.unwrap(), p);

    p.write(doc! { "tag_ids": ["replace", [blue_id]] }).await.unwrap();
    assert_eq!(p.related("tag_ids").await.unwrap().ids(), &[blue_id]);

    p.write(doc! { "tag_ids": [["create", { "name": "green" }], ["remove", blue_id]] })
        .await
        .unwrap();
    let linked = p.read(&["tag_ids"]).await.unwrap();
    let pairs = linked[0].get_array("tag_ids").unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].as_array().unwrap()[1], Bson::from("green"));

    // Linking a record that does not exist fails
    let missing = p
        .write(doc! { "tag_ids": ["add", bson::oid::ObjectId::new()] })
        .await;
    assert!(matches!(missing, Err(OlafError::NotFound(_))));

    // Plain values are refused on x2many fields
    let invalid = p.write(doc! { "tag_ids": 3 }).await;
    assert!(matches!(invalid, Err(OlafError::Validation(_))));
}

#[tokio::test]
async fn test_unlink_cascades() {
    let env = root_env().await;
    let p = env
        .model(PARTNER)
        .unwrap()
        .create(doc! {
            "name": "owner",
            "address_ids": [["create", { "street": "A" }], ["create", { "street": "B" }]],
        })
        .await
        .unwrap();
    assert_eq!(env.model(ADDRESS).unwrap().search_count(doc! {}).await.unwrap(), 2);

    assert_eq!(p.unlink().await.unwrap(), 1);
    assert_eq!(env.model(ADDRESS).unwrap().search_count(doc! {}).await.unwrap(), 0);
    assert!(!p.exists().await.unwrap());

    // Deleting again is a no-op
    assert_eq!(p.unlink().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unlink_restricted() {
    let env = root_env().await;
    let p = partner(&env, "debtor").await;
    let invoice = env
        .model(INVOICE)
        .unwrap()
        .create(doc! { "amount": 12.5, "partner_id": p.id().unwrap() })
        .await
        .unwrap();

    let result = p.unlink().await;
    assert!(matches!(result, Err(OlafError::DeletionConstraint(_))));
    assert!(p.exists().await.unwrap());

    invoice.unlink().await.unwrap();
    assert_eq!(p.unlink().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unlink_restricted_through_cascade() {
    let env = root_env().await;
    let p = env
        .model(PARTNER)
        .unwrap()
        .create(doc! { "name": "holder", "address_ids": [["create", { "street": "Main" }]] })
        .await
        .unwrap();
    let address = p.related("address_ids").await.unwrap();
    let delivery = env
        .model(DELIVERY)
        .unwrap()
        .create(doc! { "name": "parcel", "address_id": address.id().unwrap() })
        .await
        .unwrap();

    // The address would cascade, but a delivery still points at it
    let result = p.unlink().await;
    assert!(matches!(result, Err(OlafError::DeletionConstraint(_))));
    assert!(p.exists().await.unwrap());
    assert!(address.exists().await.unwrap());
    assert_eq!(address.field("partner_id").await.unwrap(), Bson::ObjectId(p.id().unwrap()));

    delivery.unlink().await.unwrap();
    assert_eq!(p.unlink().await.unwrap(), 1);
    assert!(!address.exists().await.unwrap());
}

#[tokio::test]
async fn test_unlink_sets_null() {
    let env = root_env().await;
    let category = env
        .model(CATEGORY)
        .unwrap()
        .create(doc! { "name": "Retail" })
        .await
        .unwrap();
    let p = env
        .model(PARTNER)
        .unwrap()
        .create(doc! { "name": "shop", "category_id": category.id().unwrap() })
        .await
        .unwrap();

    category.unlink().await.unwrap();
    assert_eq!(p.field("category_id").await.unwrap(), Bson::Null);
}

#[tokio::test]
async fn test_unlink_drops_relation_rows() {
    let env = root_env().await;
    let tag = env
        .model(TAG)
        .unwrap()
        .create(doc! { "name": "red" })
        .await
        .unwrap();
    let p = env
        .model(PARTNER)
        .unwrap()
        .create(doc! { "name": "tagged", "tag_ids": ["add", tag.id().unwrap()] })
        .await
        .unwrap();

    tag.unlink().await.unwrap();
    assert!(p.related("tag_ids").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_password_never_read() {
    let env = root_env().await;
    let user = env
        .model("base.user")
        .unwrap()
        .create(doc! { "name": "Alice", "email": "alice@example.com", "password": "secret" })
        .await
        .unwrap();

    let records = user.read(&[]).await.unwrap();
    assert!(!records[0].contains_key("password"));
    assert_eq!(records[0].get_str("email").unwrap(), "alice@example.com");

    assert!(user.check_password("secret").await.unwrap());
    assert!(!user.check_password("wrong").await.unwrap());
}

#[tokio::test]
async fn test_model_method_call() {
    let env = root_env().await;
    let p = partner(&env, "Ada").await;
    assert_eq!(p.call("greet", Bson::Null).await.unwrap(), Bson::from("Hello Ada"));
    assert!(matches!(
        p.call("missing", Bson::Null).await,
        Err(OlafError::NotFound(_))
    ));
}
